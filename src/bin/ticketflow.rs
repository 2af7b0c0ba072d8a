//! ticketflow CLI: operator interface to the helpdesk workflow core.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ticketflow::automation::{AutomationEngine, spawn_worker};
use ticketflow::config::secrets::ExposeSecret;
use ticketflow::config::{Config, EngineConfig};
use ticketflow::db::Db;
use ticketflow::dispatch::HttpDispatcher;
use ticketflow::model::*;
use ticketflow::sla::{EscalationExecutor, SlaClock, SlaMonitor};
use ticketflow::store::TicketStore;
use ticketflow::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use ticketflow::workflow::{Lifecycle, TicketLocks};

#[derive(Parser)]
#[command(name = "ticketflow", about = "Helpdesk workflow, SLA and automation core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the automation worker and the SLA monitor until Ctrl-C
    Serve,
    /// Run one SLA sweep now and print the report
    Sweep,
    /// Compute a due date without touching the database
    Due {
        /// SLA budget in minutes
        minutes: i64,
        /// Start instant (RFC 3339); defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Calendar: business_hours or twenty_four_seven
        #[arg(long, default_value = "business_hours")]
        calendar: String,
    },
    /// Ticket operations
    Ticket {
        #[command(subcommand)]
        action: TicketAction,
    },
    /// Evaluate automation rules for a trigger synchronously
    Trigger {
        /// Ticket ID (full UUID)
        ticket: TicketId,
        /// Trigger name, e.g. ticket_updated
        trigger: Trigger,
    },
}

#[derive(Subcommand)]
enum TicketAction {
    /// Create a ticket
    Create {
        /// Tenant ID
        #[arg(long)]
        tenant: TenantId,
        subject: String,
        #[arg(long, default_value = "normal")]
        priority: Priority,
        #[arg(long)]
        department: Option<DepartmentId>,
        /// Explicit SLA plan; otherwise derived from priority
        #[arg(long)]
        plan: Option<PlanId>,
        #[arg(long, default_value = "api")]
        source: TicketSource,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Show a ticket and its timeline
    Show { id: TicketId },
    /// Move a ticket to a new status
    Transition {
        id: TicketId,
        status: Status,
        #[arg(long)]
        actor: Option<UserId>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Assign a ticket
    Assign {
        id: TicketId,
        assignee: UserId,
        #[arg(long)]
        actor: Option<UserId>,
    },
    /// Add a comment
    Comment {
        id: TicketId,
        text: String,
        /// Hide from the requester
        #[arg(long)]
        internal: bool,
        #[arg(long)]
        actor: Option<UserId>,
    },
    /// Change priority
    Priority {
        id: TicketId,
        priority: Priority,
        #[arg(long)]
        actor: Option<UserId>,
    },
}

/// Everything the commands need, wired over one database.
struct Services {
    db: Arc<Db>,
    clock: SlaClock,
    locks: TicketLocks,
    engine: Arc<AutomationEngine>,
    dispatcher: Arc<HttpDispatcher>,
}

impl Services {
    async fn connect(config: &Config) -> anyhow::Result<Self> {
        let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
        db.migrate().await?;

        let clock = SlaClock::new(config.engine.calendar()?);
        let locks = TicketLocks::new();
        let dispatcher = Arc::new(HttpDispatcher::new(config.engine.webhook_timeout())?);
        let engine = Arc::new(AutomationEngine::new(
            db.clone(),
            db.clone(),
            dispatcher.clone(),
            clock,
            locks.clone(),
        ));
        Ok(Self {
            db,
            clock,
            locks,
            engine,
            dispatcher,
        })
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.db.clone(), self.clock, self.locks.clone())
    }

    fn executor(&self) -> EscalationExecutor {
        EscalationExecutor::new(
            self.db.clone(),
            self.db.clone(),
            self.dispatcher.clone(),
            self.locks.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::Due {
            minutes,
            start,
            calendar,
        } => cmd_due(minutes, start, &calendar),
        Command::Sweep => {
            let (_guard, config, services) = bootstrap().await?;
            cmd_sweep(&services, &config).await
        }
        Command::Trigger { ticket, trigger } => {
            let (_guard, _config, services) = bootstrap().await?;
            let report = services.engine.process_event(ticket, trigger).await?;
            println!(
                "applied: {}  not matched: {}  skipped: {}  failed: {}",
                report.applied, report.not_matched, report.skipped, report.failed
            );
            Ok(())
        }
        Command::Ticket { action } => {
            let (_guard, _config, services) = bootstrap().await?;
            cmd_ticket(&services, action).await
        }
    }
}

/// Load config, install telemetry, connect and migrate.
async fn bootstrap() -> anyhow::Result<(TelemetryGuard, Config, Services)> {
    let config = Config::from_env()?;
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "ticketflow".to_string(),
        log_level: config.log_level.clone(),
    })?;
    let services = Services::connect(&config).await?;
    Ok((guard, config, services))
}

async fn cmd_serve() -> anyhow::Result<()> {
    let (_guard, config, services) = bootstrap().await?;
    services.db.health_check().await?;

    let (queue, worker) = spawn_worker(services.engine.clone());
    let executor = Arc::new(services.executor().with_automation(queue));
    let monitor = SlaMonitor::new(services.db.clone(), executor, config.engine.monitor());

    let stop = monitor.clone();
    let signal = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        stop.shutdown();
    });

    monitor.run().await?;

    // The worker exits once every queue handle, held via the executor, drops.
    drop(monitor);
    signal.await?;
    worker.await?;
    Ok(())
}

async fn cmd_sweep(services: &Services, config: &Config) -> anyhow::Result<()> {
    let executor = Arc::new(services.executor());
    let monitor = SlaMonitor::new(services.db.clone(), executor, config.engine.monitor());
    let report = monitor.sweep(Utc::now()).await?;

    println!("Breached:   {}", report.breached);
    println!("Escalated:  {}", report.escalated);
    println!("Unchanged:  {}", report.unchanged);
    println!("Failed:     {}", report.failed);
    println!("At risk:    {}", report.warnings);
    Ok(())
}

fn cmd_due(minutes: i64, start: Option<DateTime<Utc>>, calendar: &str) -> anyhow::Result<()> {
    let engine = EngineConfig::default().with_env_overrides()?;
    let clock = SlaClock::new(engine.calendar()?);
    let calendar: CalendarMode = calendar.parse()?;

    let plan = SlaPlan {
        id: PlanId::new(),
        tenant_id: TenantId::new(),
        name: "ad hoc".to_string(),
        response_time_minutes: minutes,
        resolution_time_minutes: 0,
        calendar,
        escalation_policy: None,
        active: true,
    };
    let start = start.unwrap_or_else(Utc::now);

    match clock.compute_due_date(&plan, start) {
        Some(due) => println!("{}", due.to_rfc3339()),
        None if minutes <= 0 => anyhow::bail!("budget must be positive, got {minutes} minutes"),
        None => anyhow::bail!("a budget of {minutes} minutes is out of range"),
    }
    Ok(())
}

async fn cmd_ticket(services: &Services, action: TicketAction) -> anyhow::Result<()> {
    let lifecycle = services.lifecycle();

    match action {
        TicketAction::Create {
            tenant,
            subject,
            priority,
            department,
            plan,
            source,
            tags,
        } => {
            let mut new = NewTicket::new(tenant, subject)
                .priority(priority)
                .source(source);
            if let Some(department) = department {
                new = new.department(department);
            }
            if let Some(plan) = plan {
                new = new.sla_plan(plan);
            }
            for tag in tags {
                new = new.tag(tag);
            }
            let ticket = lifecycle.create_ticket(new).await?;
            println!("Created: {} (due: {})", ticket.id.0, fmt_due(ticket.due_at));
        }
        TicketAction::Show { id } => {
            let ticket = lifecycle.get(id).await?;
            let events = services.db.ticket_events(id).await?;

            println!("ID:         {}", ticket.id.0);
            println!("Tenant:     {}", ticket.tenant_id.0);
            println!("Subject:    {}", ticket.subject);
            println!("Status:     {}", ticket.status);
            println!("Priority:   {}", ticket.priority);
            println!(
                "Assignee:   {}",
                ticket
                    .assignee
                    .map(|u| u.0.to_string())
                    .unwrap_or("-".to_string())
            );
            println!("Due:        {}", fmt_due(ticket.due_at));
            if let Some(closed) = ticket.closed_at {
                println!("Closed:     {closed}");
            }
            if !ticket.tags.is_empty() {
                let tags: Vec<&str> = ticket.tags.iter().map(String::as_str).collect();
                println!("Tags:       {}", tags.join(", "));
            }
            println!("Version:    {}", ticket.version);
            println!("---");
            for event in &events {
                println!(
                    "{}  {:<18}  {:<8}  {}",
                    event.created_at.format("%Y-%m-%d %H:%M"),
                    event.event_type(),
                    event.visibility,
                    serde_json::to_string(&event.kind)?
                );
            }
        }
        TicketAction::Transition {
            id,
            status,
            actor,
            note,
        } => {
            lifecycle.transition(id, status, actor, note).await?;
            println!("{} -> {status}", id.0);
        }
        TicketAction::Assign {
            id,
            assignee,
            actor,
        } => {
            lifecycle.assign(id, assignee, actor).await?;
            println!("{} assigned to {}", id.0, assignee.0);
        }
        TicketAction::Comment {
            id,
            text,
            internal,
            actor,
        } => {
            lifecycle.add_comment(id, text, internal, actor).await?;
            println!("Comment added to {}", id.0);
        }
        TicketAction::Priority {
            id,
            priority,
            actor,
        } => {
            lifecycle.change_priority(id, priority, actor).await?;
            let ticket = lifecycle.get(id).await?;
            println!(
                "{} priority {priority} (due: {})",
                id.0,
                fmt_due(ticket.due_at)
            );
        }
    }
    Ok(())
}

fn fmt_due(due: Option<DateTime<Utc>>) -> String {
    due.map(|d| d.to_rfc3339()).unwrap_or("-".to_string())
}
