use clap::{Parser, Subcommand};

/// Intake and sheet administration for the BYOD RAR application form.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON configuration file. Relative paths inside it are
    /// relative to its directory. Without it, the defaults apply in the current directory.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The response sheet (CSV, or an .xlsx export for verify-headers). Setting this
    /// option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub sheet: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Writes the expected column names into the empty cells of the header row.
    SetupHeaders,
    /// Compares the header row of the sheet with the expected columns.
    VerifyHeaders {
        /// (default RARresponses) When using an Excel file, the name of the worksheet to use.
        #[clap(long, value_parser)]
        worksheet: Option<String>,
        /// Also prints a line diff of the expected and actual header rows.
        #[clap(long, takes_value = false)]
        diff: bool,
    },
    /// Gives a submission identifier to every row that has none.
    BackfillIds,
    /// Stores one submission given as a JSON object and replies in JSON.
    Append {
        /// (file path, '-' or empty) The submission. Read from standard input by default.
        #[clap(short, long, value_parser)]
        input: Option<String>,
    },
    /// Fills in the application form from a JSON file of answers and submits it.
    Submit {
        /// (file path, '-' or empty) The answers, keyed by column name.
        #[clap(short, long, value_parser)]
        answers: Option<String>,
        /// The human verification token.
        #[clap(long, value_parser)]
        token: Option<String>,
        /// Ignores and discards any saved draft.
        #[clap(long, takes_value = false)]
        fresh: bool,
    },
    /// Discards the saved draft.
    ClearDraft,
}
