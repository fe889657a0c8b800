#[tokio::main]
async fn main() {
    match remotefs::cli::run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("remotefs: {}", err);
            std::process::exit(1);
        }
    }
}
