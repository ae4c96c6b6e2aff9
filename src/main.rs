fn main() -> anyhow::Result<()> {
    magictree::logging::init();
    magictree::cli::run()
}
