use super::{print_steps, Session};
use crate::cli::{FinalizeArgs, TrackArgs, TransferArgs, WithdrawSendArgs};
use anyhow::Result;
use zks_bridge::withdrawal::{
    FinalizeOutcome, WithdrawalHandle, WithdrawalParams, WithdrawalWaitTarget, Withdrawals,
};

fn params(args: &TransferArgs) -> WithdrawalParams {
    WithdrawalParams {
        token: args.token,
        amount: args.amount,
        to: args.to,
        ..Default::default()
    }
}

pub async fn run_quote(args: TransferArgs, session: &Session) -> Result<()> {
    let ctx = session.context(&args.chain)?;
    let sender = session.sender_address(&args.signer)?;
    let plan = Withdrawals::new(ctx).prepare(&params(&args), sender).await?;
    session.emit(&plan, |plan| {
        println!("route:      {}", plan.route);
        if let Some(asset_id) = plan.summary.asset_id {
            println!("assetId:    {asset_id:#x}");
        }
        println!("approvals:  {}", plan.summary.approvals_needed.len());
        println!("steps:");
        print_steps(&plan.steps);
    })
}

pub async fn run_send(args: WithdrawSendArgs, session: &Session) -> Result<()> {
    let ctx = session.context(&args.transfer.chain)?;
    let sender = session.l2_sender(&args.transfer.signer, &ctx)?;
    let withdrawals = Withdrawals::new(ctx).with_wait(session.wait(&args.wait_args));
    let handle = withdrawals.create(&params(&args.transfer), &sender).await?;
    session.emit(&handle, |handle| {
        for (key, hash) in &handle.step_hashes {
            println!("{key}: {hash:#x}");
        }
        println!("finalize once ready: zks-bridge withdraw finalize --tx {:#x}", handle.l2_tx_hash);
    })
}

pub async fn run_status(args: TrackArgs, session: &Session) -> Result<()> {
    let withdrawals = Withdrawals::new(session.context(&args.chain)?);
    let status = withdrawals
        .status(&mut WithdrawalHandle::from_tx(args.tx))
        .await?;
    session.emit(&status, |status| println!("phase: {:?}", status.phase))
}

pub async fn run_finalize(args: FinalizeArgs, session: &Session) -> Result<()> {
    let ctx = session.context(&args.track.chain)?;
    let sender = session.l1_sender(&args.signer, &ctx).await?;
    let wait = session.wait(&args.wait_args);
    let withdrawals = Withdrawals::new(ctx).with_wait(wait.clone());
    let mut handle = WithdrawalHandle::from_tx(args.track.tx);
    if args.wait {
        withdrawals
            .wait(&mut handle, WithdrawalWaitTarget::Ready, &wait)
            .await?;
    }
    let outcome = withdrawals.finalize(&mut handle, &sender).await?;
    session.emit(&outcome, |outcome| match outcome {
        FinalizeOutcome::AlreadyFinalized => println!("already finalized"),
        FinalizeOutcome::Submitted { tx_hash } => println!("finalized: {tx_hash:#x}"),
    })
}
