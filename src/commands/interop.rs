use super::{print_steps, Session};
use crate::cli::{BundleArgs, InteropSendArgs, InteropTrackArgs, RelayArgs};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use zks_bridge::interop::{
    BundleValuePolicy, CallStatus, Interop, InteropHandle, InteropItem, InteropParams,
    InteropStatus, InteropWaitTarget, RelayMode, RelayOutcome,
};

fn interop(session: &Session, source: &str, destination: &str) -> Result<Interop> {
    Ok(Interop::new(
        session.context(source)?,
        session.context(destination)?,
        session.bundle_index(),
    )
    .with_log_lookback(session.config.interop.log_lookback_blocks))
}

/// Items come inline as a JSON array or from a file holding one.
fn load_items(value: &str) -> Result<Vec<InteropItem>> {
    let raw = if Path::new(value).exists() {
        std::fs::read_to_string(value)
            .with_context(|| format!("failed to read items from {value}"))?
    } else {
        value.to_string()
    };
    serde_json::from_str(&raw).context("items must be a JSON array of interop items")
}

fn params(args: &BundleArgs, session: &Session) -> Result<InteropParams> {
    let value_policy = match args.value_policy.as_deref() {
        Some(policy) => policy.parse::<BundleValuePolicy>()?,
        None => session.config.interop.value_policy,
    };
    Ok(InteropParams {
        items: load_items(&args.items)?,
        execution_address: args.execution_address,
        unbundler: args.unbundler,
        value_policy,
        ..Default::default()
    })
}

pub async fn run_quote(args: BundleArgs, session: &Session) -> Result<()> {
    let interop = interop(session, &args.source, &args.destination)?;
    let sender = session.sender_address(&args.signer)?;
    let plan = interop.prepare(&params(&args, session)?, sender).await?;
    session.emit(&plan, |plan| {
        println!("route:        {}", plan.route);
        println!("value:        {}", plan.summary.total_value);
        println!("registrations: {}", plan.summary.registrations.len());
        println!("approvals:    {}", plan.summary.approvals_needed.len());
        println!("steps:");
        print_steps(&plan.steps);
    })
}

pub async fn run_send(args: InteropSendArgs, session: &Session) -> Result<()> {
    let interop = interop(session, &args.bundle.source, &args.bundle.destination)?
        .with_wait(session.wait(&args.wait_args));
    let source = session.context(&args.bundle.source)?;
    let sender = session.l2_sender(&args.bundle.signer, &source)?;
    let handle = interop.create(&params(&args.bundle, session)?, &sender).await?;
    session.emit(&handle, |handle| {
        for (key, hash) in &handle.step_hashes {
            println!("{key}: {hash:#x}");
        }
        if let Some(bundle_hash) = handle.bundle_hash {
            println!("bundleHash: {bundle_hash:#x}");
        }
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    #[serde(flatten)]
    status: InteropStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    calls: Option<Vec<CallStatus>>,
}

pub async fn run_status(args: InteropTrackArgs, session: &Session) -> Result<()> {
    let interop = interop(session, &args.source, &args.destination)?;
    let mut handle = InteropHandle::from_tx(args.tx);
    let status = match args.until.as_deref() {
        None => interop.status(&mut handle).await?,
        Some(until) => {
            let target = match until {
                "sent" => InteropWaitTarget::Sent,
                "verified" => InteropWaitTarget::Verified,
                "executed" => InteropWaitTarget::Executed,
                other => bail!("invalid --until {other} (expected sent, verified or executed)"),
            };
            interop
                .wait(&mut handle, target, &session.wait(&args.wait_args))
                .await?
        }
    };
    let calls = match (args.calls, status.bundle_hash) {
        (Some(count), Some(bundle_hash)) => Some(interop.call_statuses(bundle_hash, count).await?),
        _ => None,
    };
    session.emit(&StatusOutput { status, calls }, |output| {
        println!("phase: {:?}", output.status.phase);
        if let Some(bundle_hash) = output.status.bundle_hash {
            println!("bundleHash: {bundle_hash:#x}");
        }
        for (index, call) in output.calls.iter().flatten().enumerate() {
            println!("call[{index}] {call:?}");
        }
    })
}

pub async fn run_relay(args: RelayArgs, session: &Session) -> Result<()> {
    let mode: RelayMode = args.mode.parse()?;
    let interop = interop(session, &args.source, &args.destination)?;
    let destination = session.context(&args.destination)?;
    let sender = session.l2_sender(&args.signer, &destination)?;
    let wait = session.wait(&args.wait_args);
    let mut handle = InteropHandle::from_tx(args.tx);

    if args.dry_run {
        let plan = interop.prepare_relay(&mut handle, mode, &sender, &wait).await?;
        return session.emit(&plan, |plan| match plan {
            Some(plan) => {
                println!("bundleHash: {:#x}", plan.bundle_hash);
                println!(
                    "batch {} message {} root {:#x}",
                    plan.source_batch, plan.message_index, plan.root
                );
                print_steps(std::slice::from_ref(&plan.step));
            }
            None => println!("nothing to relay"),
        });
    }

    let outcome = interop.relay(&mut handle, mode, &sender, &wait).await?;
    session.emit(&outcome, |outcome| match outcome {
        RelayOutcome::Skipped { phase } => println!("skipped: bundle already {phase:?}"),
        RelayOutcome::Submitted { tx_hash } => println!("relayed: {tx_hash:#x}"),
    })
}
