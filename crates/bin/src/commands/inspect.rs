//! State inspection command - shows the validator, its owner and policies.

use vouch::state::AuthorizationState;
use vouch::validator::ValidatorConfig;

use crate::cli::InspectArgs;
use crate::commands::decode_state;
use crate::output::{OutputFormat, print_fields, print_table};

/// Run the inspect command
pub fn run(args: &InspectArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let state = decode_state(&args.state, &args.decode)?;

    match format {
        OutputFormat::Human => print_human(&state),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "identifier": state.identifier(),
                "owner_identifier": state.owner_identifier(),
                "state": state,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn print_human(state: &AuthorizationState) {
    let mut fields = vec![
        ("Kind", state.kind().to_string()),
        ("Identifier", state.identifier().to_string()),
    ];
    if let Some(owner) = &state.owner {
        fields.push(("Owner", format!("{} ({})", owner.identifier(), owner.kind())));
        let enabled = if state.enable_signature.is_some() {
            "yes"
        } else {
            "no"
        };
        fields.push(("Enabled", enabled.to_string()));
    }

    match &state.validator {
        ValidatorConfig::SingleSigner { signer } => {
            fields.push(("Signer", signer.to_string()));
            print_fields(&fields);
        }
        ValidatorConfig::WeightedMultisig(config) => {
            fields.push((
                "Threshold",
                format!("{} of {}", config.threshold(), config.total_weight()),
            ));
            if let Some(pending) = &state.pending {
                let digest = pending
                    .digest()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "none".to_string());
                fields.push(("Pending digest", digest));
                fields.push(("Approvals", pending.len().to_string()));
            }
            print_fields(&fields);
            println!();
            let rows: Vec<Vec<String>> = config
                .signers()
                .iter()
                .map(|entry| vec![entry.signer.to_string(), entry.weight.to_string()])
                .collect();
            print_table(&["SIGNER", "WEIGHT"], &rows);
        }
        ValidatorConfig::PermissionScoped { signer, policies } => {
            fields.push(("Session signer", signer.to_string()));
            print_fields(&fields);
            println!();
            let rows: Vec<Vec<String>> = policies
                .policies()
                .iter()
                .enumerate()
                .map(|(i, policy)| vec![i.to_string(), policy.kind().to_string()])
                .collect();
            print_table(&["#", "POLICY"], &rows);
        }
    }
}
