use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();
    slackbridge_cli::run()
}
