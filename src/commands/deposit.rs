use super::{print_steps, Session};
use crate::cli::{DepositArgs, DepositSendArgs, DepositWaitArgs, TrackArgs};
use anyhow::{bail, Result};
use zks_bridge::deposit::{DepositHandle, DepositParams, DepositWaitTarget, Deposits};

fn params(args: &DepositArgs) -> DepositParams {
    DepositParams {
        token: args.transfer.token,
        amount: args.transfer.amount,
        to: args.transfer.to,
        refund_recipient: args.refund_recipient,
        operator_tip: args.operator_tip,
        l2_gas_limit: args.l2_gas_limit,
        ..Default::default()
    }
}

pub async fn run_quote(args: DepositArgs, session: &Session) -> Result<()> {
    let ctx = session.context(&args.transfer.chain)?;
    let sender = session.sender_address(&args.transfer.signer)?;
    let plan = Deposits::new(ctx).prepare(&params(&args), sender).await?;
    session.emit(&plan, |plan| {
        let quote = &plan.summary;
        println!("route:            {}", plan.route);
        println!("baseCost:         {}", quote.base_cost);
        println!("mintValue:        {}", quote.mint_value);
        println!("l2GasLimit:       {}", quote.suggested_l2_gas_limit);
        println!("gasPerPubdata:    {}", quote.gas_per_pubdata);
        println!("approvals:        {}", quote.approvals_needed.len());
        println!("steps:");
        print_steps(&plan.steps);
    })
}

pub async fn run_send(args: DepositSendArgs, session: &Session) -> Result<()> {
    let ctx = session.context(&args.deposit.transfer.chain)?;
    let sender = session.l1_sender(&args.deposit.transfer.signer, &ctx).await?;
    let wait = session.wait(&args.wait_args);
    let deposits = Deposits::new(ctx).with_wait(wait.clone());
    let mut handle = deposits.create(&params(&args.deposit), &sender).await?;
    if args.wait {
        deposits.wait(&mut handle, DepositWaitTarget::L2, &wait).await?;
    }
    let status = deposits.status(&mut handle).await?;
    session.emit(&(handle, status), |(handle, status)| {
        for (key, hash) in &handle.step_hashes {
            println!("{key}: {hash:#x}");
        }
        println!("phase: {:?}", status.phase);
        if let Some(l2) = status.l2_tx_hash {
            println!("l2TxHash: {l2:#x}");
        }
    })
}

pub async fn run_status(args: TrackArgs, session: &Session) -> Result<()> {
    let deposits = Deposits::new(session.context(&args.chain)?);
    let mut handle = DepositHandle::from_tx(args.tx);
    let status = deposits.status(&mut handle).await?;
    session.emit(&status, |status| {
        println!("phase: {:?}", status.phase);
        if let Some(l2) = status.l2_tx_hash {
            println!("l2TxHash: {l2:#x}");
        }
        if handle.derived_via_fallback {
            println!("warning: L2 hash derived from raw log topics");
        }
    })
}

pub async fn run_wait(args: DepositWaitArgs, session: &Session) -> Result<()> {
    let target = match args.until.as_str() {
        "l1" => DepositWaitTarget::L1,
        "l2" => DepositWaitTarget::L2,
        other => bail!("invalid --until {other} (expected l1 or l2)"),
    };
    let deposits = Deposits::new(session.context(&args.track.chain)?);
    let mut handle = DepositHandle::from_tx(args.track.tx);
    let receipt = deposits
        .wait(&mut handle, target, &session.wait(&args.wait_args))
        .await?;
    session.emit(&receipt, |receipt| {
        println!("txHash: {:#x}", receipt.transaction_hash);
        println!("status: {}", if receipt.status { "success" } else { "failed" });
        if let Some(block) = receipt.block_number {
            println!("block:  {block}");
        }
    })
}
