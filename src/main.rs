fn main() {
    mocap_pipeline::cli::run();
}
