use std::process::ExitCode;

fn main() -> ExitCode {
    match sievefwd::cli::xmain() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
