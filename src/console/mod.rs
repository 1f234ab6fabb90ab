//! Terminal host for a playback: reads line commands from stdin and prints
//! snapshot updates as they are published.

pub mod commands;
pub mod render;

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use log::{debug, warn};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::watch,
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::Database,
    identity::IdentityProvider,
    ledger::LocalCompletionLedger,
    timer::{PlaybackSnapshot, TimerController},
};

use commands::{parse_command, ConsoleCommand, HELP};
use render::{announcement, render_plan_intro, render_report_row, render_session_row, render_status};

const HISTORY_LIMIT: usize = 10;

pub struct Console {
    controller: TimerController,
    db: Database,
    identity: Arc<dyn IdentityProvider>,
    ledger: Arc<LocalCompletionLedger>,
}

impl Console {
    pub fn new(
        controller: TimerController,
        db: Database,
        identity: Arc<dyn IdentityProvider>,
        ledger: Arc<LocalCompletionLedger>,
    ) -> Self {
        Self {
            controller,
            db,
            identity,
            ledger,
        }
    }

    pub async fn run(self) -> Result<()> {
        println!("{}", render_plan_intro(self.controller.plan()));
        println!("{}", render_status(&self.controller.snapshot().await));
        println!("Type `help` for commands.");

        let cancel_token = CancellationToken::new();
        let printer = tokio::spawn(print_updates(
            self.controller.subscribe(),
            cancel_token.clone(),
        ));

        let mut lines = BufReader::new(io::stdin()).lines();
        let outcome = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err.into()),
            };

            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(ConsoleCommand::Quit)) => break Ok(()),
                Ok(Some(command)) => {
                    if let Err(err) = self.handle(command).await {
                        println!("! {err:#}");
                    }
                }
                Err(err) => println!("! {err}"),
            }
        };

        cancel_token.cancel();
        if let Err(err) = printer.await {
            debug!("snapshot printer ended abnormally: {err}");
        }
        self.controller.shutdown().await;
        if let Err(err) = self.db.close().await {
            warn!("Database did not close cleanly: {err:#}");
        }
        outcome
    }

    async fn handle(&self, command: ConsoleCommand) -> Result<()> {
        let controller = &self.controller;
        // Playback changes are printed by the update task.
        match command {
            ConsoleCommand::Start => {
                controller.start().await?;
            }
            ConsoleCommand::Pause => {
                controller.pause().await?;
            }
            ConsoleCommand::Reset => {
                controller.reset().await?;
            }
            ConsoleCommand::Save(input) => {
                controller.save_capture(input).await?;
            }
            ConsoleCommand::Skip => {
                controller.skip_capture().await?;
            }
            ConsoleCommand::Sos(text) => {
                controller.report_symptom(&text).await?;
                println!("SOS recorded. If symptoms persist, stop and seek medical help.");
            }
            ConsoleCommand::Status => println!("{}", render_status(&controller.snapshot().await)),
            ConsoleCommand::History => self.print_history().await?,
            ConsoleCommand::Report => self.print_report().await?,
            ConsoleCommand::WhoAmI => self.print_identity(),
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    async fn print_history(&self) -> Result<()> {
        let Some(user) = self.identity.current_user() else {
            println!("Not signed in; sessions are not stored.");
            return Ok(());
        };
        let sessions = self.db.list_sessions_for_user(&user.id, HISTORY_LIMIT).await?;
        if sessions.is_empty() {
            println!("No sessions yet.");
        }
        for session in &sessions {
            let vitals = self.db.vital_signs_for_session(&session.id).await?;
            let symptoms = self.db.symptoms_for_session(&session.id).await?;
            println!(
                "{}  [{} vital sign(s), {} SOS]",
                render_session_row(session),
                vitals.len(),
                symptoms.len()
            );
        }
        Ok(())
    }

    async fn print_report(&self) -> Result<()> {
        if !self.identity.is_admin() {
            println!("The weekly report is only available to administrators.");
            return Ok(());
        }
        let report = self.db.weekly_report().await?;
        if report.is_empty() {
            println!("No data yet.");
        }
        for row in &report {
            println!("{}", render_report_row(row));
        }
        Ok(())
    }

    fn print_identity(&self) {
        match self.identity.current_user() {
            Some(user) => {
                let role = self
                    .identity
                    .current_user_role()
                    .map_or("no role".to_string(), |role| format!("{role:?}").to_lowercase());
                println!("{} <{}> ({role})", user.id, user.email);
            }
            None => println!("anonymous"),
        }
        let today = Local::now().date_naive();
        println!(
            "Plans completed this week: {}{}",
            self.ledger.completed_in_week(today),
            if self.ledger.is_completed(today) {
                " (including today)"
            } else {
                ""
            }
        );
    }
}

async fn print_updates(
    mut updates: watch::Receiver<PlaybackSnapshot>,
    cancel_token: CancellationToken,
) {
    let mut previous = updates.borrow_and_update().clone();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = updates.borrow_and_update().clone();
                if let Some(text) = announcement(&previous, &next) {
                    println!("{text}");
                }
                previous = next;
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
