use clap::Parser;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Balance a chemical equation: compute the smallest positive integer stoichiometric coefficients that conserve every element.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// The chemical equation to balance, e.g. "C2H5OH + O2 -> CO2 + H2O"
    pub equation: String,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
