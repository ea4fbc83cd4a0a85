//! Background execution of incident side effects.
//!
//! An accepted submission becomes a [`Sequence`]: an ordered list of Slack calls. The sequence
//! runs on its own task under a context detached from the HTTP request, so it keeps the request's
//! span and localizer but is not cancelled when the response is sent. A failing step is logged,
//! counted, and reported to the user with a best-effort ephemeral notice; the next step still runs.

use std::{future::Future, sync::Arc, time::Duration};

use devopsbot_core::{
    AdminCache, Context,
    slack::{OutgoingMessage, SlackClient, SlackError},
};
use devopsbot_telemetry::SharedMetrics;
use serde_json::json;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::i18n::{Catalogs, Localizer, Msg};

const ALREADY_IN_CHANNEL: &str = "already_in_channel";

/// Who hears about step failures: an ephemeral message to `user` in `channel`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notify {
    pub channel: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Looks up the bot user and invites it to the channel.
    JoinChannel { channel: String },
    SetPurpose { channel: String, text: String },
    SetTopic { channel: String, text: String },
    Invite { channel: String, users: Vec<String> },
    Post(OutgoingMessage),
    Remind {
        channel: String,
        text: String,
        time: String,
    },
    /// Archives the channel. With `requested_by` set and an admin group configured, only admins
    /// may archive; anyone else gets a notice instead.
    Archive {
        channel: String,
        requested_by: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: &'static str,
    pub action: Action,
    /// Notice sent to the user when the step fails; `None` only logs.
    pub on_failure: Option<Msg>,
}

impl Step {
    pub fn new(name: &'static str, action: Action) -> Self {
        Self {
            name,
            action,
            on_failure: None,
        }
    }

    pub fn notify_on_failure(mut self, msg: Msg) -> Self {
        self.on_failure = Some(msg);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub name: &'static str,
    pub notify: Notify,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Done,
    Skipped,
}

/// What happened to each step of a sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub completed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
    /// Set when the runner was shut down before every step ran.
    pub interrupted: bool,
}

/// Spawns and tracks background sequences.
#[derive(Clone)]
pub struct TaskRunner {
    tracker: TaskTracker,
    lifetime: Context,
    slack: Arc<dyn SlackClient>,
    admins: Option<Arc<AdminCache>>,
    catalogs: Arc<Catalogs>,
    metrics: SharedMetrics,
}

impl TaskRunner {
    pub fn new(
        slack: Arc<dyn SlackClient>,
        admins: Option<Arc<AdminCache>>,
        catalogs: Arc<Catalogs>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            tracker: TaskTracker::new(),
            lifetime: Context::background(),
            slack,
            admins,
            catalogs,
            metrics,
        }
    }

    /// Runs `work` on a new task with a context whose values come from `request` and whose
    /// lifetime belongs to the runner.
    pub fn spawn<F, Fut>(&self, request: &Context, work: F)
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ctx = Context::detach(&self.lifetime, request);
        let fut = work(ctx.clone());
        self.tracker.spawn(ctx.instrument(fut));
    }

    pub fn spawn_sequence(&self, request: &Context, sequence: Sequence) {
        let runner = self.clone();
        self.spawn(request, move |ctx| async move {
            runner.run(&ctx, sequence).await;
        });
    }

    /// Executes `sequence` in order. Never fails; the report is also logged.
    pub async fn run(&self, ctx: &Context, sequence: Sequence) -> SequenceReport {
        let l10n = ctx
            .value::<Localizer>()
            .cloned()
            .unwrap_or_else(|| self.catalogs.default_localizer());
        let mut report = SequenceReport::default();
        info!(sequence = sequence.name, steps = sequence.steps.len(), "sequence started");

        for step in &sequence.steps {
            if let Some(reason) = ctx.err() {
                warn!(sequence = sequence.name, step = step.name, %reason, "sequence interrupted");
                report.interrupted = true;
                break;
            }
            match self.execute(&l10n, &sequence.notify, &step.action).await {
                Ok(Outcome::Done) => {
                    debug!(sequence = sequence.name, step = step.name, "step done");
                    report.completed.push(step.name);
                }
                Ok(Outcome::Skipped) => {
                    debug!(sequence = sequence.name, step = step.name, "step skipped");
                    report.skipped.push(step.name);
                }
                Err(err) => {
                    error!(sequence = sequence.name, step = step.name, error = %err, "step failed");
                    self.metrics.step_failed(sequence.name, step.name);
                    if let Some(msg) = step.on_failure {
                        self.notice(&sequence.notify, l10n.with_error(msg, &err)).await;
                    }
                    report.failed.push((step.name, err.to_string()));
                }
            }
        }

        info!(
            sequence = sequence.name,
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            interrupted = report.interrupted,
            "sequence finished"
        );
        report
    }

    async fn execute(
        &self,
        l10n: &Localizer,
        notify: &Notify,
        action: &Action,
    ) -> Result<Outcome, SlackError> {
        let slack = self.slack.as_ref();
        match action {
            Action::JoinChannel { channel } => {
                let identity = slack.auth_test().await?;
                tolerate_already_in_channel(
                    slack
                        .invite_users(channel, std::slice::from_ref(&identity.user_id))
                        .await,
                )
            }
            Action::SetPurpose { channel, text } => {
                slack.set_purpose(channel, text).await?;
                Ok(Outcome::Done)
            }
            Action::SetTopic { channel, text } => {
                slack.set_topic(channel, text).await?;
                Ok(Outcome::Done)
            }
            Action::Invite { channel, users } => {
                if users.is_empty() {
                    return Ok(Outcome::Skipped);
                }
                tolerate_already_in_channel(slack.invite_users(channel, users).await)
            }
            Action::Post(message) => {
                slack.send_message(message.clone()).await?;
                Ok(Outcome::Done)
            }
            Action::Remind {
                channel,
                text,
                time,
            } => {
                slack.add_channel_reminder(channel, text, time).await?;
                Ok(Outcome::Done)
            }
            Action::Archive {
                channel,
                requested_by,
            } => {
                if let (Some(user), Some(admins)) = (requested_by, &self.admins) {
                    if !admins.is_member(slack, user).await {
                        info!(user_id = %user, channel = %channel, "archive refused for non-admin");
                        let text = l10n.render(Msg::ArchiveNotPermitted, &json!({ "channel": channel }));
                        self.notice(notify, text).await;
                        return Ok(Outcome::Skipped);
                    }
                }
                slack.archive_conversation(channel).await?;
                Ok(Outcome::Done)
            }
        }
    }

    async fn notice(&self, notify: &Notify, text: String) {
        let message = OutgoingMessage::ephemeral(&notify.channel, &notify.user, text);
        if let Err(err) = self.slack.send_message(message).await {
            error!(error = %err, channel = %notify.channel, "could not send failure notice");
        }
    }

    /// Stops accepting work and waits up to `grace` for running sequences. Returns `false` when
    /// the grace period ran out; remaining sequences are then interrupted between steps.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                pending = self.tracker.len(),
                "background sequences still running at shutdown"
            );
            self.lifetime.cancel();
        }
        drained
    }

    /// Waits for every sequence spawned so far; the runner stays usable afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}

fn tolerate_already_in_channel(result: Result<(), SlackError>) -> Result<Outcome, SlackError> {
    match result {
        Ok(()) => Ok(Outcome::Done),
        Err(err) if err.is(ALREADY_IN_CHANNEL) => Ok(Outcome::Skipped),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use devopsbot_core::testkit::{RecordingSlackClient, SlackCall};
    use devopsbot_telemetry::{BotMetrics, BuildInfo};

    use super::*;

    fn runner(slack: Arc<RecordingSlackClient>, admins: Option<Arc<AdminCache>>) -> TaskRunner {
        let metrics = Arc::new(BotMetrics::new("test", &BuildInfo::default()).unwrap());
        TaskRunner::new(slack, admins, Catalogs::embedded().unwrap(), metrics)
    }

    fn notify() -> Notify {
        Notify {
            channel: "CBROAD".into(),
            user: "U1".into(),
        }
    }

    fn sequence(steps: Vec<Step>) -> Sequence {
        Sequence {
            name: "declare",
            notify: notify(),
            steps,
        }
    }

    #[tokio::test]
    async fn failing_step_notifies_and_later_steps_still_run() {
        let slack = Arc::new(RecordingSlackClient::new());
        slack.fail("conversations.setPurpose", "not_in_channel");
        let runner = runner(Arc::clone(&slack), None);

        let report = runner
            .run(
                &Context::background(),
                sequence(vec![
                    Step::new(
                        "set_purpose",
                        Action::SetPurpose {
                            channel: "C1".into(),
                            text: "overview".into(),
                        },
                    )
                    .notify_on_failure(Msg::FailedSetPurpose),
                    Step::new(
                        "set_topic",
                        Action::SetTopic {
                            channel: "C1".into(),
                            text: "overview".into(),
                        },
                    ),
                ]),
            )
            .await;

        assert_eq!(report.completed, vec!["set_topic"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "set_purpose");
        assert_eq!(
            slack.messages(),
            vec![OutgoingMessage::ephemeral(
                "CBROAD",
                "U1",
                "Failed to set purpose for incident channel: conversations.setPurpose failed: not_in_channel"
            )]
        );
        assert_eq!(runner.metrics.step_failure_count("declare", "set_purpose"), 1.0);
    }

    #[tokio::test]
    async fn already_in_channel_is_not_a_failure() {
        let slack = Arc::new(RecordingSlackClient::new());
        slack.fail("conversations.invite", "already_in_channel");
        let runner = runner(Arc::clone(&slack), None);

        let report = runner
            .run(
                &Context::background(),
                sequence(vec![
                    Step::new(
                        "join_broadcast",
                        Action::JoinChannel {
                            channel: "CBROAD".into(),
                        },
                    ),
                    Step::new(
                        "invite",
                        Action::Invite {
                            channel: "C1".into(),
                            users: vec!["U2".into()],
                        },
                    )
                    .notify_on_failure(Msg::FailedInvite),
                ]),
            )
            .await;

        assert!(report.failed.is_empty());
        assert_eq!(report.skipped, vec!["join_broadcast", "invite"]);
        assert_eq!(
            slack.calls_to("conversations.invite")[0],
            SlackCall::InviteUsers {
                channel: "CBROAD".into(),
                users: vec!["UBOT".into()],
            }
        );
        assert!(slack.messages().is_empty());
    }

    #[tokio::test]
    async fn empty_invite_list_is_skipped_without_a_call() {
        let slack = Arc::new(RecordingSlackClient::new());
        let runner = runner(Arc::clone(&slack), None);
        let report = runner
            .run(
                &Context::background(),
                sequence(vec![Step::new(
                    "invite",
                    Action::Invite {
                        channel: "C1".into(),
                        users: Vec::new(),
                    },
                )]),
            )
            .await;
        assert_eq!(report.skipped, vec!["invite"]);
        assert_eq!(slack.count("conversations.invite"), 0);
    }

    #[tokio::test]
    async fn archive_requires_admin_when_group_configured() {
        let slack = Arc::new(
            RecordingSlackClient::new()
                .with_group("SADMIN", &["UADMIN"])
                .with_channel("C1", "inc_db_oct_3"),
        );
        let admins = Some(Arc::new(AdminCache::new("SADMIN")));
        let runner = runner(Arc::clone(&slack), admins);

        let archive = |user: &str| {
            sequence(vec![Step::new(
                "archive",
                Action::Archive {
                    channel: "C1".into(),
                    requested_by: Some(user.into()),
                },
            )])
        };

        let report = runner.run(&Context::background(), archive("U1")).await;
        assert_eq!(report.skipped, vec!["archive"]);
        assert_eq!(slack.count("conversations.archive"), 0);
        assert!(slack.messages()[0].text.contains("Only members of the admin group"));

        let report = runner.run(&Context::background(), archive("UADMIN")).await;
        assert_eq!(report.completed, vec!["archive"]);
        assert_eq!(slack.count("conversations.archive"), 1);
        assert_eq!(slack.count("usergroups.users.list"), 1);
    }

    #[tokio::test]
    async fn notices_use_the_localizer_from_the_context() {
        let slack = Arc::new(RecordingSlackClient::new());
        slack.fail("reminders.add", "invalid_time");
        let runner = runner(Arc::clone(&slack), None);
        let ctx = Context::background().with_value(Catalogs::embedded().unwrap().localizer("fr"));

        runner
            .run(
                &ctx,
                sequence(vec![
                    Step::new(
                        "reminder",
                        Action::Remind {
                            channel: "C1".into(),
                            text: "update".into(),
                            time: "Every 30 min".into(),
                        },
                    )
                    .notify_on_failure(Msg::FailedReminder),
                ]),
            )
            .await;

        assert!(
            slack.messages()[0]
                .text
                .starts_with("Impossible d'ajouter le rappel de suivi")
        );
    }

    #[tokio::test]
    async fn spawned_sequence_outlives_cancelled_request() {
        let slack = Arc::new(RecordingSlackClient::new());
        let runner = runner(Arc::clone(&slack), None);
        let request = Context::background().child();

        runner.spawn_sequence(
            &request,
            sequence(vec![Step::new(
                "announce",
                Action::Post(OutgoingMessage::channel("CBROAD", "declared")),
            )]),
        );
        request.cancel();
        runner.wait_idle().await;

        assert_eq!(
            slack.messages(),
            vec![OutgoingMessage::channel("CBROAD", "declared")]
        );
        assert_eq!(runner.pending(), 0);
    }

    #[tokio::test]
    async fn cancelled_runner_interrupts_between_steps() {
        let slack = Arc::new(RecordingSlackClient::new());
        let runner = runner(Arc::clone(&slack), None);
        let ctx = Context::detach(&runner.lifetime, &Context::background());
        runner.lifetime.cancel();

        let report = runner
            .run(
                &ctx,
                sequence(vec![Step::new(
                    "announce",
                    Action::Post(OutgoingMessage::channel("CBROAD", "declared")),
                )]),
            )
            .await;
        assert!(report.interrupted);
        assert!(report.completed.is_empty());
        assert!(slack.calls().is_empty());
    }

    #[tokio::test]
    async fn shutdown_waits_for_running_sequences() {
        let slack = Arc::new(RecordingSlackClient::new());
        let runner = runner(Arc::clone(&slack), None);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        runner.spawn(&Context::background(), move |_ctx| async move {
            let _ = rx.await;
        });

        let shutdown = tokio::spawn({
            let runner = runner.clone();
            async move { runner.shutdown(Duration::from_secs(5)).await }
        });
        tx.send(()).unwrap();
        assert!(shutdown.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_grace_period() {
        let slack = Arc::new(RecordingSlackClient::new());
        let runner = runner(Arc::clone(&slack), None);
        runner.spawn(&Context::background(), |ctx| async move {
            ctx.done().await;
        });

        assert!(!runner.shutdown(Duration::from_secs(1)).await);
        assert!(runner.lifetime.is_done());
    }
}
