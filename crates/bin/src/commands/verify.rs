//! Signature verification command.

use crate::cli::VerifyArgs;
use crate::commands::decode_state;
use crate::output::OutputFormat;

/// Run the verify command
///
/// Fails when the signature does not satisfy the validator.
pub fn run(args: &VerifyArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let state = decode_state(&args.state, &args.decode)?;
    let signature = hex::decode(args.signature.trim_start_matches("0x"))?;
    let result = state.validator.verify(&args.digest, &signature);

    match format {
        OutputFormat::Human => match &result {
            Ok(()) => println!("valid: {} accepts the signature", state.identifier()),
            Err(e) => println!("invalid: {e}"),
        },
        OutputFormat::Json => {
            let value = serde_json::json!({
                "validator": state.identifier(),
                "digest": args.digest,
                "valid": result.is_ok(),
                "error": result.as_ref().err().map(ToString::to_string),
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(result?)
}
