use std::process::ExitCode;
use storage_ops::StorageError;
use storage_ops::output as out;

mod app;
mod cli;
mod logging;

fn main() -> ExitCode {
    let args = cli::parse();
    match app::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            out::print_error(&format!("{e:#}"));
            let code = e.downcast_ref::<StorageError>().map_or(1, StorageError::code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
