use revisiond::cli;

#[tokio::main]
async fn main() {
    if let Err(err) = cli::run_cli().await {
        eprintln!("revisiond: {err}");
        std::process::exit(1);
    }
}
