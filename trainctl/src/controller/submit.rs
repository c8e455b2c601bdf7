use crate::output::OutputFormatter;
use crate::service::lifecycle::{JobLifecycle, SubmitRequest};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct Submitted<'a> {
    name:      &'a str,
    requested: &'a str,
    namespace: &'a str,
}

/// Prints the chart values the request would be submitted with.
pub fn dry_run(request: &SubmitRequest) -> Result<()> {
    let values = request.values()?;
    print!("{}", serde_yaml::to_string(&values)?);
    Ok(())
}

pub async fn submit_job(
    lifecycle: &Arc<dyn JobLifecycle>,
    request: &SubmitRequest,
    namespace: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let submission = lifecycle
        .submit(request, namespace)
        .await
        .with_context(|| format!("Failed to submit {}", request.name))?;
    let identity = &submission.identity;

    let submitted = Submitted {
        name:      &identity.resolved,
        requested: identity.requested.as_ref(),
        namespace,
    };
    if let Some(rendered) = formatter.render_value(&submitted)? {
        println!("{rendered}");
        return Ok(());
    }

    if identity.resolved != identity.requested.to_string() {
        println!(
            "The name {} is taken, the job was named {}",
            identity.requested, identity.resolved
        );
    }
    println!("The job {} has been submitted successfully", identity.resolved);
    Ok(())
}
