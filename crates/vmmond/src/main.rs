use std::process::ExitCode;

fn main() -> ExitCode {
    match vmmond::run_monitor() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("vmmond: {error}");
            ExitCode::FAILURE
        }
    }
}
