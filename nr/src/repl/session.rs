//! Interactive tutoring session

use std::collections::HashMap;
use std::io::{self, Write};

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::render;
use crate::domain::{GoalFormPayload, MessageKind};
use crate::llm::Role;
use crate::state::StateEvent;
use crate::tutor::{GoalOutcome, SendMode, SendOutcome, Tutor};

/// Interactive session over a `Tutor`
pub struct ChatRepl {
    tutor: Tutor,
}

impl ChatRepl {
    pub fn new(tutor: Tutor) -> Self {
        Self { tutor }
    }

    /// Run the session, optionally creating a goal first
    pub async fn run(mut self, new_goal: Option<GoalFormPayload>) -> Result<()> {
        let printer = Printer::spawn(self.tutor.state().subscribe_events());
        self.print_welcome();

        match new_goal {
            Some(payload) => {
                println!("{}", "Formulating your strategy...".bright_cyan());
                let outcome = self.tutor.create_goal(&payload).await?;
                printer.sync().await;
                match outcome {
                    GoalOutcome::Created { goal_id } => debug!(%goal_id, "ChatRepl::run: goal created"),
                    GoalOutcome::UpgradeRequired => {
                        println!(
                            "{}",
                            "Free accounts are limited to one goal. Upgrade to Pro to create more.".yellow()
                        );
                    }
                    GoalOutcome::Failed { .. } => {}
                }
            }
            None => {
                self.tutor.resume().await?;
                printer.sync().await;
            }
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;
        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));
            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    let result = match self.handle_input(input).await {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => Ok(()),
                        Err(e) => Err(e),
                    };
                    printer.sync().await;
                    if let Err(e) = result {
                        warn!(error = %format!("{:#}", e), "Command failed");
                        println!("{} {:#}", "Error:".red(), e);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        printer.stop().await;
        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Neura".bright_cyan().bold());
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:18} Show this help", "/help".yellow());
        println!("  {:18} Exit the session", "/quit".yellow());
        println!("  {:18} Confirm the proposed strategy", "/confirm".yellow());
        println!("  {:18} Accept the proposed plan update", "/accept".yellow());
        println!("  {:18} Decline the proposed plan update", "/decline".yellow());
        println!("  {:18} Show the current plan", "/plan".yellow());
        println!("  {:18} Show the numbered conversation", "/history".yellow());
        println!("  {:18} Rewrite message N and ask again", "/edit N text".yellow());
        println!("  {:18} Generate an image", "/image prompt".yellow());
        println!();
    }

    async fn handle_input(&mut self, input: &str) -> Result<Flow> {
        let (cmd, rest) = input.split_once(' ').unwrap_or((input, ""));
        match cmd {
            "/help" | "/h" => self.print_help(),
            "/quit" | "/q" | "/exit" => return Ok(Flow::Quit),
            "/confirm" => {
                if !self.tutor.confirm().await? {
                    println!("{}", "There is no strategy awaiting confirmation.".dimmed());
                }
            }
            "/accept" => {
                if !self.tutor.accept_update().await? {
                    println!("{}", "There is no plan update to accept.".dimmed());
                }
            }
            "/decline" => {
                if !self.tutor.decline_update().await? {
                    println!("{}", "There is no plan update to decline.".dimmed());
                }
            }
            "/plan" => {
                let state = self.tutor.state().snapshot().await?;
                match state.active_goal() {
                    Some(goal) => println!("{}", render::timeline(goal)),
                    None => println!("{}", "No active goal.".dimmed()),
                }
            }
            "/history" => self.print_history().await?,
            "/edit" => self.edit(rest).await?,
            // `/image` is handled by the tutor
            c if c.starts_with('/') && c != "/image" => {
                println!("{} Unknown command: {}", "?".yellow(), c);
                println!("Type {} for available commands", "/help".yellow());
            }
            _ => {
                let outcome = self.tutor.handle_send(input, SendMode::Typed).await?;
                self.report(outcome);
            }
        }
        Ok(Flow::Continue)
    }

    async fn print_history(&self) -> Result<()> {
        let state = self.tutor.state().snapshot().await?;
        if state.transcript.is_empty() {
            println!("{}", "No conversation yet.".dimmed());
            return Ok(());
        }
        for (i, message) in state.transcript.messages().iter().enumerate() {
            let preview: String = match message.kind {
                MessageKind::Text => message.content.chars().take(60).collect(),
                MessageKind::Strategy { .. } => "[strategy]".to_string(),
                MessageKind::Image => "[image]".to_string(),
                MessageKind::PlanUpdateProposal { .. } => "[plan update]".to_string(),
            };
            let role = match message.role {
                Role::User => "you".bright_green(),
                Role::Assistant => "neura".bright_blue(),
            };
            println!("  {:>3}. {}: {}", i + 1, role, preview);
        }
        Ok(())
    }

    async fn edit(&mut self, args: &str) -> Result<()> {
        let (index, text) = args.trim().split_once(' ').unwrap_or((args.trim(), ""));
        let Ok(index) = index.parse::<usize>() else {
            println!("Usage: {}", "/edit N new text".yellow());
            return Ok(());
        };
        let state = self.tutor.state().snapshot().await?;
        let target = index
            .checked_sub(1)
            .and_then(|i| state.transcript.messages().get(i))
            .filter(|m| m.role == Role::User && matches!(m.kind, MessageKind::Text));
        let Some(target) = target else {
            println!("{}", "Message N must be one of your own messages (see /history).".dimmed());
            return Ok(());
        };
        let outcome = self.tutor.edit_message(&target.id, text).await?;
        self.report(outcome);
        Ok(())
    }

    fn report(&self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Blocked => println!(
                "{}",
                "Please wait for the strategy, or answer the plan update with /accept or /decline.".yellow()
            ),
            SendOutcome::NoSession => println!(
                "{}",
                "No active plan to discuss. Create a goal with `neura goal new`.".dimmed()
            ),
            SendOutcome::Replied | SendOutcome::Confirmed | SendOutcome::Empty => {}
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Prints state events as they arrive
struct Printer {
    barrier_tx: mpsc::Sender<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Printer {
    fn spawn(events: broadcast::Receiver<StateEvent>) -> Self {
        let (barrier_tx, barrier_rx) = mpsc::channel(4);
        let handle = tokio::spawn(print_events(events, barrier_rx));
        Self { barrier_tx, handle }
    }

    /// Wait until every event broadcast so far has been printed
    async fn sync(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.barrier_tx.send(ack_tx).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    async fn stop(self) {
        self.sync().await;
        self.handle.abort();
    }
}

async fn print_events(
    mut events: broadcast::Receiver<StateEvent>,
    mut barrier_rx: mpsc::Receiver<oneshot::Sender<()>>,
) {
    let mut view = View::default();
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => view.show(event),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(ack) = barrier_rx.recv() => {
                // Events are broadcast before a dispatch returns, so they are already queued
                while let Ok(event) = events.try_recv() {
                    view.show(event);
                }
                view.finish_line();
                let _ = ack.send(());
            }
        }
    }
}

/// Text already printed per streamed message
#[derive(Default)]
struct View {
    streamed: HashMap<String, String>,
    mid_line: bool,
}

impl View {
    fn show(&mut self, event: StateEvent) {
        match event {
            StateEvent::MessageAdded { message } => {
                // Typed input is already on screen; empty bubbles fill in later
                let empty = matches!(message.kind, MessageKind::Text) && message.content.is_empty();
                if message.role == Role::User || empty {
                    return;
                }
                self.print_block(&render::message(&message));
            }
            StateEvent::TextAppended { message_id, delta } => {
                print!("{}", delta);
                let _ = io::stdout().flush();
                self.mid_line = !delta.ends_with('\n');
                self.streamed.entry(message_id).or_default().push_str(&delta);
            }
            StateEvent::MessageUpdated { message } => {
                let already = self.streamed.get(&message.id).is_some_and(|s| *s == message.content);
                if !already && !(matches!(message.kind, MessageKind::Text) && message.content.is_empty()) {
                    self.print_block(&render::message(&message));
                }
            }
            StateEvent::PhaseReceived {
                status,
                subtitle,
                progress,
                ..
            } => {
                self.print_block(&format!(
                    "{} {} {}",
                    format!("[{:>3.0}%]", progress).bright_cyan(),
                    status,
                    subtitle.dimmed()
                ));
            }
            StateEvent::TranscriptReset => self.streamed.clear(),
            StateEvent::MessageRemoved { message_id } => {
                self.streamed.remove(&message_id);
            }
            StateEvent::PlanChanged { .. } | StateEvent::ReviewChanged { .. } | StateEvent::ProposalCleared => {}
        }
    }

    fn print_block(&mut self, text: &str) {
        self.finish_line();
        println!("{}", text);
    }

    fn finish_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}
