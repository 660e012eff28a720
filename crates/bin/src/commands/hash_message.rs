//! Prefixed message digest command.

use vouch::auth::hash_message;

use crate::cli::HashMessageArgs;
use crate::output::OutputFormat;

/// Run the hash-message command
pub fn run(args: &HashMessageArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let digest = hash_message(&args.message);
    match format {
        OutputFormat::Human => println!("{digest}"),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&serde_json::json!({ "digest": digest }))?)
        }
    }
    Ok(())
}
