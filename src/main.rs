fn main() {
    adaptive_clustering::cli::run();
}
