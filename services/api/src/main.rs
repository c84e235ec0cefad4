use merchant_kyc_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("merchant-kyc error: {err}");
        std::process::exit(1);
    }
}
