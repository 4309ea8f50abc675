mod cli;
mod logging;

use crate::cli::Cli;
use clap::Parser;
use equilib::{BalanceError, Equation};
use std::process::ExitCode;
use tracing::info;

const SEPARATOR: &str = "_______________________________";

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup(cli.verbose, cli.quiet);

    match run(&cli.equation) {
        Ok(balanced) => {
            println!("{}", cli.equation);
            println!("{SEPARATOR}");
            println!("{balanced}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{}: {}", error.kind(), error);
            ExitCode::from(exit_code(&error))
        }
    }
}

fn run(input: &str) -> Result<String, BalanceError> {
    let mut equation = Equation::parse(input)?;
    equation.solve()?;
    info!("balanced {:?}", equation.original_str());

    // solve succeeded, so the coefficients are stored
    Ok(equation.balanced_str().unwrap())
}

fn exit_code(error: &BalanceError) -> u8 {
    match error {
        BalanceError::Parse(_) => 2,
        BalanceError::Format { .. } => 3,
        BalanceError::Unbalanceable(_) => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_prints_balanced_equation() {
        let balanced = run("H2 + O2 -> H2O").unwrap();
        assert_eq!(balanced, "2H2 + O2 -> 2H2O");
    }

    #[test]
    fn exit_code_follows_error_kind() {
        assert_eq!(exit_code(&run("H2 + O2 H2O").unwrap_err()), 2);
        assert_eq!(exit_code(&run("H2 O2 -> H2O").unwrap_err()), 3);
        assert_eq!(exit_code(&run("H2 -> O2").unwrap_err()), 4);
    }
}
