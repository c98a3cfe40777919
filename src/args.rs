use clap::Parser;

/// This is an analyzer for approval voting strategies over spatial electorates.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file containing the description of the electorate and the
    /// simulation parameters, in JSON format. For more information about the file format,
    /// read the documentation.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path or empty) If specified, the summary of the analysis will be written in
    /// JSON format to the given location instead of the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
