//! Per-activation worker loops.
//!
//! Non-re-entrant activations run the single-writer loop: one envelope fully
//! processed before the next is dequeued. Re-entrant activations fan out up
//! to `max_inflight` envelopes concurrently over a shared instance. Handler
//! failures are answered, dead-lettered, and fed to supervision; the worker
//! itself only exits when its mailbox closes or a directive stops it.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::handle::{ActivationShared, RejectMode};
use super::manager::ManagerInner;
use crate::actor::table::{ActorInstance, ErasedActor, ErasedSharedActor};
use crate::actor::{ActivationContext, RuntimeEnv};
use crate::error::{ErrorKind, InvokeError};
use crate::mailbox::{MailboxReceiver, MailboxSender};
use crate::message::{CallChain, Envelope, Operation};
use crate::monitoring::{names, TelemetryEvent};
use crate::supervision::{Directive, FailureCause};
use crate::util::ActorKey;

/// What the loop does after an envelope completes.
enum PostAction {
    Continue,
    Restart,
    Stop,
}

pub(crate) async fn run_worker(
    manager: Arc<ManagerInner>,
    shared: Arc<ActivationShared>,
    receiver: MailboxReceiver,
    sender: MailboxSender,
    instance: ActorInstance,
) {
    let Some(env) = manager.env.get().map(Arc::clone) else {
        warn!(actor = %shared.key, "runtime environment not wired, rejecting envelopes");
        drain_reject(
            receiver,
            ErrorKind::PeerShutdown,
            "silo runtime is not initialized",
        )
        .await;
        return;
    };

    match instance {
        ActorInstance::Exclusive(actor) => {
            run_exclusive(manager, shared, receiver, sender, env, actor).await;
        }
        ActorInstance::Shared(actor) => {
            run_shared(manager, shared, receiver, sender, env, actor).await;
        }
    }
}

/// Answer every envelope with `kind` while draining a condemned mailbox.
async fn drain_reject(mut receiver: MailboxReceiver, kind: ErrorKind, message: &str) {
    while let Some(mut envelope) = receiver.recv().await {
        envelope.respond(Err(InvokeError::new(kind, message.to_string())));
    }
}

/// Answer one envelope that arrived after the activation was condemned.
fn reject_condemned(envelope: &mut Envelope, key: &ActorKey, mode: RejectMode) {
    let error = match mode {
        RejectMode::NotOwner => {
            InvokeError::not_owner(format!("{key} was drained after an ownership change"))
        }
        RejectMode::Terminated => InvokeError::new(
            ErrorKind::SupervisionTerminated,
            format!("activation {key} was terminated"),
        ),
        RejectMode::None => return,
    };
    envelope.respond(Err(error));
}

fn invocation_context(
    key: &ActorKey,
    env: &Arc<dyn RuntimeEnv>,
    chain: &CallChain,
) -> ActivationContext {
    ActivationContext::new(key.clone(), Arc::clone(env), chain.extended(key.clone()))
}

async fn run_exclusive(
    manager: Arc<ManagerInner>,
    shared: Arc<ActivationShared>,
    mut receiver: MailboxReceiver,
    sender: MailboxSender,
    env: Arc<dyn RuntimeEnv>,
    mut actor: Box<dyn ErasedActor>,
) {
    let key = shared.key.clone();
    let mut activated = false;
    let mut terminated = false;

    while let Some(mut envelope) = receiver.recv().await {
        shared.touch();

        let mode = shared.reject_mode();
        if mode != RejectMode::None {
            reject_condemned(&mut envelope, &key, mode);
            continue;
        }
        if envelope.is_expired(Utc::now()) {
            envelope.respond(Err(InvokeError::timeout(
                "deadline elapsed before dispatch",
            )));
            continue;
        }

        let ctx = invocation_context(&key, &env, &envelope.chain);

        if !activated {
            manager
                .telemetry
                .record(TelemetryEvent::actor(names::ACTOR_ACTIVATE, key.clone()));
            match actor.activate(&ctx).await {
                Ok(()) => activated = true,
                Err(err) => {
                    warn!(actor = %key, error = %err, "activation failed");
                    envelope.respond(Err(err.into_invoke_error()));
                    match manager.resolve_directive(&key, FailureCause::ActivationFailed) {
                        Directive::Restart => {
                            if let ActorInstance::Exclusive(fresh) =
                                shared.descriptor.spawn(&key)
                            {
                                actor = fresh;
                            }
                        }
                        Directive::Resume => {}
                        Directive::Stop | Directive::Escalate => {
                            terminated = true;
                            break;
                        }
                    }
                    continue;
                }
            }
        }

        shared.begin_dispatch();
        manager
            .telemetry
            .record(TelemetryEvent::actor(names::ACTOR_INVOKE, key.clone()));
        let result = actor
            .handle(&ctx, &envelope.operation, envelope.payload.clone())
            .await;
        shared.end_dispatch();
        shared.touch();

        match result {
            Ok(bytes) => {
                if matches!(envelope.operation, Operation::Stream { .. }) {
                    manager
                        .telemetry
                        .record(TelemetryEvent::actor(names::STREAM_CONSUME, key.clone()));
                }
                envelope.respond(Ok(bytes));
            }
            Err(err) => {
                let cause = err.to_string();
                manager.dlq.push(envelope.record(), key.clone(), cause);
                receiver.metrics().record_dead_lettered();
                envelope.respond(Err(err.into_invoke_error()));

                match manager.resolve_directive(&key, FailureCause::HandlerError) {
                    Directive::Resume => {}
                    Directive::Restart => {
                        debug!(actor = %key, "restarting activation after handler error");
                        if let ActorInstance::Exclusive(fresh) = shared.descriptor.spawn(&key) {
                            actor = fresh;
                            activated = false;
                        }
                    }
                    Directive::Stop | Directive::Escalate => {
                        terminated = true;
                        break;
                    }
                }
            }
        }
    }

    if terminated {
        shared.condemn(RejectMode::Terminated);
        sender.close();
        while let Some(mut envelope) = receiver.recv().await {
            reject_condemned(&mut envelope, &key, RejectMode::Terminated);
        }
    }

    if activated {
        manager
            .telemetry
            .record(TelemetryEvent::actor(names::ACTOR_DEACTIVATE, key.clone()));
        let ctx = invocation_context(&key, &env, &CallChain::new());
        if let Err(err) = actor.deactivate(&ctx).await {
            warn!(actor = %key, error = %err, "deactivation hook failed");
        }
    }
    manager.remove_worker_slot(&key, &shared);
    debug!(actor = %key, "activation stopped");
}

async fn run_shared(
    manager: Arc<ManagerInner>,
    shared: Arc<ActivationShared>,
    mut receiver: MailboxReceiver,
    sender: MailboxSender,
    env: Arc<dyn RuntimeEnv>,
    mut actor: Arc<dyn ErasedSharedActor>,
) {
    let key = shared.key.clone();
    let max_inflight = shared.descriptor.options().max_inflight.max(1);
    let mut inflight: FuturesUnordered<BoxFuture<'static, PostAction>> = FuturesUnordered::new();
    let mut open = true;
    let mut activated = false;
    let mut terminated = false;

    loop {
        tokio::select! {
            maybe = receiver.recv(), if open && inflight.len() < max_inflight => {
                let Some(mut envelope) = maybe else {
                    open = false;
                    continue;
                };
                shared.touch();

                let mode = shared.reject_mode();
                if mode != RejectMode::None {
                    reject_condemned(&mut envelope, &key, mode);
                    continue;
                }
                if envelope.is_expired(Utc::now()) {
                    envelope.respond(Err(InvokeError::timeout(
                        "deadline elapsed before dispatch",
                    )));
                    continue;
                }

                if !activated {
                    let ctx = invocation_context(&key, &env, &CallChain::new());
                    manager
                        .telemetry
                        .record(TelemetryEvent::actor(names::ACTOR_ACTIVATE, key.clone()));
                    match actor.activate(&ctx).await {
                        Ok(()) => activated = true,
                        Err(err) => {
                            warn!(actor = %key, error = %err, "activation failed");
                            envelope.respond(Err(err.into_invoke_error()));
                            match manager.resolve_directive(&key, FailureCause::ActivationFailed) {
                                Directive::Restart => {
                                    if let ActorInstance::Shared(fresh) =
                                        shared.descriptor.spawn(&key)
                                    {
                                        actor = fresh;
                                    }
                                }
                                Directive::Resume => {}
                                Directive::Stop | Directive::Escalate => {
                                    terminated = true;
                                    open = false;
                                    sender.close();
                                }
                            }
                            continue;
                        }
                    }
                }

                inflight.push(Box::pin(process_shared(
                    Arc::clone(&manager),
                    Arc::clone(&shared),
                    Arc::clone(&env),
                    Arc::clone(&actor),
                    envelope,
                )));
            }
            Some(action) = inflight.next() => {
                match action {
                    PostAction::Continue => {}
                    PostAction::Restart => {
                        debug!(actor = %key, "restarting activation after handler error");
                        if let ActorInstance::Shared(fresh) = shared.descriptor.spawn(&key) {
                            actor = fresh;
                            activated = false;
                        }
                    }
                    PostAction::Stop => {
                        terminated = true;
                        open = false;
                        sender.close();
                    }
                }
            }
            else => break,
        }
    }

    while inflight.next().await.is_some() {}

    if terminated {
        shared.condemn(RejectMode::Terminated);
        while let Some(mut envelope) = receiver.recv().await {
            reject_condemned(&mut envelope, &key, RejectMode::Terminated);
        }
    }

    if activated {
        manager
            .telemetry
            .record(TelemetryEvent::actor(names::ACTOR_DEACTIVATE, key.clone()));
        let ctx = invocation_context(&key, &env, &CallChain::new());
        if let Err(err) = actor.deactivate(&ctx).await {
            warn!(actor = %key, error = %err, "deactivation hook failed");
        }
    }
    manager.remove_worker_slot(&key, &shared);
    debug!(actor = %key, "activation stopped");
}

async fn process_shared(
    manager: Arc<ManagerInner>,
    shared: Arc<ActivationShared>,
    env: Arc<dyn RuntimeEnv>,
    actor: Arc<dyn ErasedSharedActor>,
    mut envelope: Envelope,
) -> PostAction {
    let key = shared.key.clone();
    let ctx = invocation_context(&key, &env, &envelope.chain);

    shared.begin_dispatch();
    manager
        .telemetry
        .record(TelemetryEvent::actor(names::ACTOR_INVOKE, key.clone()));
    let result = actor
        .handle(&ctx, &envelope.operation, envelope.payload.clone())
        .await;
    shared.end_dispatch();
    shared.touch();

    match result {
        Ok(bytes) => {
            if matches!(envelope.operation, Operation::Stream { .. }) {
                manager
                    .telemetry
                    .record(TelemetryEvent::actor(names::STREAM_CONSUME, key.clone()));
            }
            envelope.respond(Ok(bytes));
            PostAction::Continue
        }
        Err(err) => {
            let cause = err.to_string();
            manager.dlq.push(envelope.record(), key.clone(), cause);
            envelope.respond(Err(err.into_invoke_error()));
            match manager.resolve_directive(&key, FailureCause::HandlerError) {
                Directive::Resume => PostAction::Continue,
                Directive::Restart => PostAction::Restart,
                Directive::Stop | Directive::Escalate => PostAction::Stop,
            }
        }
    }
}
