use tripdesk_core::identity::IdentityPolicy;
use tripdesk_db::{DemoSeedDataset, SeedResult};

use crate::commands::{open_migrated, prepare, CommandResult, Failure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };
    let admin = IdentityPolicy::from_config(&config.identity).admin_user();

    let result = runtime.block_on(async {
        let pool = open_migrated(&config).await?;

        let outcome = async {
            let seeded = DemoSeedDataset::load(&pool, &admin)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            let verification = DemoSeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            if !verification.all_present {
                let failed = failed_checks(&verification.checks);
                return Err(("seed_verification", verification_message(&failed), 6u8));
            }
            Ok::<SeedResult, Failure>(seeded)
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => {
            let lines = DemoSeedDataset::descriptions()
                .into_iter()
                .map(|(id, description)| format!("  - {id}: {description}"))
                .collect::<Vec<_>>();
            let message = format!(
                "demo dataset ready with {} travel requests:\n{}",
                lines.len(),
                lines.join("\n")
            );
            let data = serde_json::json!({
                "users_created": seeded.users_created,
                "requests_created": seeded.requests_created,
                "reimbursements_created": seeded.reimbursements_created,
                "skipped": seeded.skipped,
            });
            CommandResult::success_with("seed", message, Some(data))
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn failed_checks(checks: &[(&'static str, bool)]) -> Vec<&'static str> {
    checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect()
}

fn verification_message(failed: &[&str]) -> String {
    if failed.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}
