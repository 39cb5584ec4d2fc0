use apiprobe_cli::cli;

#[tokio::main]
async fn main() {
    match cli::run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(cli::EXIT_LOAD);
        }
    }
}
