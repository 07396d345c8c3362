//! Interactive funnel walk-through — `funnel-engine run`.
//!
//! Drives a published funnel definition from the terminal: dialoguer
//! prompts stand in for the step UIs, the booking webhook stands in for the
//! embedded widget's message channel, and local demo stores stand in for
//! the remote endpoints when none are configured.

use anyhow::Result;
use async_trait::async_trait;
use console::style;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use indicatif::ProgressBar;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use funnel_engine::analytics::AnalyticsHub;
use funnel_engine::analytics::providers::providers_from;
use funnel_engine::booking::webhook::BookingWebhook;
use funnel_engine::booking::{BookingListener, BookingPayload, WidgetMessage};
use funnel_engine::errors::StoreError;
use funnel_engine::events::{EventRecorder, EventSink, FunnelEventRecord};
use funnel_engine::funnel::answers::{self, AnswerValue};
use funnel_engine::funnel::intent::StepIntent;
use funnel_engine::funnel::{FunnelDefinition, StepType};
use funnel_engine::persistence::http::{HttpEventSink, HttpLeadStore};
use funnel_engine::persistence::{LeadSaver, LeadStore, LeadUpsertRequest, UtmParams};
use funnel_engine::sequencer::{AdvanceOutcome, AdvanceRejection, FunnelSession, SessionContext};
use funnel_engine::EngineConfig;

pub async fn cmd_run(
    funnel_path: &Path,
    config: &EngineConfig,
    serve_webhook: bool,
    utm: UtmParams,
) -> Result<()> {
    let definition = Arc::new(FunnelDefinition::load(funnel_path)?);

    let store: Arc<dyn LeadStore> = match &config.api.lead_endpoint {
        Some(url) => Arc::new(HttpLeadStore::new(url.clone(), config.api.api_key.clone())),
        None => {
            println!(
                "{}",
                style("No lead endpoint configured, using local demo store").dim()
            );
            Arc::new(DemoLeadStore::default())
        }
    };
    let sink: Arc<dyn EventSink> = match &config.api.events_endpoint {
        Some(url) => Arc::new(HttpEventSink::new(url.clone(), config.api.api_key.clone())),
        None => Arc::new(DemoEventSink),
    };

    let mut session = FunnelSession::new(
        definition.clone(),
        SessionContext {
            team_id: config.team.team_id.clone(),
            team_privacy_policy_url: config.team.privacy_policy_url.clone(),
            utm,
        },
        LeadSaver::new(store, definition.id.clone(), config.team.team_id.clone()),
        EventRecorder::new(sink, config.team.team_id.clone(), definition.id.clone()),
        AnalyticsHub::new(providers_from(&definition.settings.tracking)),
    );

    // Widget channel → single-shot listener → booking inbox for the loop.
    let (booking_tx, mut booking_rx) = mpsc::channel::<BookingPayload>(4);
    let mut _webhook = None;
    let mut _listener = None;
    if definition.has_embed_step() {
        let (widget_tx, widget_rx) = mpsc::channel::<WidgetMessage>(16);
        let tx = booking_tx.clone();
        _listener = Some(BookingListener::spawn(
            widget_rx,
            config.booking.widget_domain.clone(),
            Duration::from_millis(config.booking.confirm_delay_ms),
            move |payload| {
                let _ = tx.try_send(payload);
            },
        ));

        if serve_webhook {
            let mut webhook =
                BookingWebhook::new(widget_tx, config.booking.widget_domain.clone());
            let url = webhook.start(&config.booking.webhook_bind).await?;
            println!(
                "{} {}{}",
                style("Booking webhook listening at").dim(),
                url,
                style("/widget-message").dim()
            );
            _webhook = Some(webhook);
        }
    }

    println!();
    println!("{}", style(&definition.name).bold().underlined());
    session.start();

    while !session.is_complete() {
        let Some(step) = session.current_step().cloned() else {
            break;
        };

        println!();
        if let Some(headline) = step.content.headline() {
            println!("{}", style(headline).bold());
        }

        let value = match step.step_type {
            StepType::Welcome | StepType::Video | StepType::ThankYou | StepType::Unknown => {
                prompt_continue()?;
                None
            }
            StepType::TextQuestion => {
                let text: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("Your answer")
                    .allow_empty(!step.content.is_required)
                    .interact_text()?;
                Some(AnswerValue::Text(text))
            }
            StepType::MultiChoice => {
                let options = step.content.options();
                if options.is_empty() {
                    prompt_continue()?;
                    None
                } else {
                    let selection = Select::with_theme(&ColorfulTheme::default())
                        .with_prompt("Pick one")
                        .items(&options)
                        .default(0)
                        .interact()?;
                    Some(AnswerValue::Choices(vec![options[selection].clone()]))
                }
            }
            StepType::EmailCapture => {
                let email: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("Email address")
                    .validate_with(|input: &String| -> Result<(), &str> {
                        if answers::looks_like_email(input) {
                            Ok(())
                        } else {
                            Err("That doesn't look like an email address")
                        }
                    })
                    .interact_text()?;
                Some(AnswerValue::Text(email))
            }
            StepType::PhoneCapture => {
                let phone: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("Phone number")
                    .interact_text()?;
                Some(AnswerValue::Text(phone))
            }
            StepType::OptIn => Some(AnswerValue::Flag(true)),
            StepType::Embed => {
                if let Some(url) = &step.content.embed_url {
                    println!("Schedule a time: {}", style(url).underlined());
                }
                prompt_continue()?;
                while let Ok(payload) = booking_rx.try_recv() {
                    session.record_booking(payload);
                }
                None
            }
        };

        if session.requires_consent() {
            let accepted = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!(
                    "I accept the privacy policy ({})",
                    session.policy_url()
                ))
                .default(false)
                .interact()?;
            session.set_consent_checked(accepted);
        }

        let intent = StepIntent::classify(step.step_type);
        let spinner = (intent == StepIntent::Capture).then(|| {
            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(80));
            pb.set_message("Saving your details...");
            pb
        });

        let outcome = session.advance(value).await;
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        match outcome {
            AdvanceOutcome::Advanced { .. } | AdvanceOutcome::Ignored => {}
            AdvanceOutcome::Completed => break,
            AdvanceOutcome::Rejected(AdvanceRejection::ConsentRequired) => {
                println!(
                    "{}",
                    style(session.consent_error().unwrap_or("Consent is required")).red()
                );
            }
            AdvanceOutcome::Rejected(AdvanceRejection::AnswerRequired) => {
                println!("{}", style("This step is required").red());
            }
            AdvanceOutcome::Rejected(AdvanceRejection::MissingPolicyUrl) => {
                anyhow::bail!(
                    "Funnel misconfigured: a capture step has no privacy policy URL. \
                     Configure one on the step, the funnel, or the team."
                );
            }
        }
    }

    println!();
    println!("{}", style("Funnel complete").green().bold());
    if let Some(lead_id) = session.lead_id() {
        println!("Lead: {}", lead_id);
    }
    println!("{} answer(s) captured", session.answers().len());
    Ok(())
}

fn prompt_continue() -> Result<()> {
    let _: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Press Enter to continue")
        .allow_empty(true)
        .interact_text()?;
    Ok(())
}

/// In-memory stand-in for the lead endpoint: adopts one lead id per run
/// and echoes it back, mimicking the upsert contract.
#[derive(Default)]
struct DemoLeadStore {
    lead_id: Mutex<Option<String>>,
}

#[async_trait]
impl LeadStore for DemoLeadStore {
    async fn upsert(&self, request: &LeadUpsertRequest) -> Result<serde_json::Value, StoreError> {
        let id = self
            .lead_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| format!("ld_{}", Uuid::new_v4().simple()))
            .clone();
        tracing::info!(
            mode = %request.submit_mode,
            step_id = %request.step_id,
            request_id = %request.client_request_id,
            "Demo lead store accepted upsert"
        );
        Ok(serde_json::json!({ "lead_id": id }))
    }
}

/// Logging stand-in for the event-recording endpoint.
struct DemoEventSink;

#[async_trait]
impl EventSink for DemoEventSink {
    async fn record(&self, record: FunnelEventRecord) -> Result<(), StoreError> {
        tracing::info!(
            event_type = %record.event_type,
            dedupe_key = %record.dedupe_key,
            "Demo event sink recorded event"
        );
        Ok(())
    }
}
