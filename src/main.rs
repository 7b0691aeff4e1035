#[tokio::main]
async fn main() -> std::process::ExitCode {
    deskpilot_lib::run().await
}
