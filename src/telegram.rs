//! Inbound side of the approval conversation: button presses arrive as
//! callback queries and are translated into `resolve` calls. Telegram may
//! deliver a decision more than once; `resolve` makes duplicates harmless.

use crate::approval::{ApprovalOrchestrator, Decision};
use std::sync::Arc;
use teloxide::{dptree, prelude::*};
use tracing::{debug, error, info};

pub async fn run(bot: Bot, orchestrator: Arc<ApprovalOrchestrator>) {
    info!("starting telegram decision listener");
    let handler = Update::filter_callback_query().endpoint(on_decision);
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![orchestrator])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_decision(
    bot: Bot,
    query: CallbackQuery,
    orchestrator: Arc<ApprovalOrchestrator>,
) -> ResponseResult<()> {
    // Acknowledge first so the client stops showing a spinner.
    let _ = bot.answer_callback_query(query.id.clone()).await;

    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let Some(message) = query.message.as_ref() else {
        return Ok(());
    };
    let handle = message.id.0 as i64;
    let decided_by = query
        .from
        .username
        .clone()
        .unwrap_or_else(|| query.from.id.to_string());

    let decision = match data.split_once(':') {
        Some(("approve", _)) => Decision::Approve { decided_by },
        Some(("reject", _)) => Decision::Reject {
            decided_by,
            reason: "Manually rejected via Telegram".into(),
        },
        _ => return Ok(()),
    };

    match orchestrator.resolve(handle, decision).await {
        Ok(true) => {}
        Ok(false) => debug!(handle, "decision arrived after resolution; dropped"),
        Err(err) => error!(?err, handle, "failed to apply approval decision"),
    }
    Ok(())
}
