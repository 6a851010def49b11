mod cli;
mod logger;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        log::error!("{}", e);
        if e.is_hashing_failure() {
            log::error!("The image could not be verified; ask the sender to resend it");
        }
        std::process::exit(1);
    }
}
