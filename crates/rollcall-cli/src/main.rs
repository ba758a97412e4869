use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::types::Angle;
use std::path::{Path, PathBuf};

// D-Bus proxy for rollcalld. Generated async by `#[zbus::proxy]`.
#[allow(clippy::too_many_arguments)]
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn push_presence(
        &self,
        id: &str,
        name: &str,
        email: &str,
        avatar: &str,
        status: &str,
        at_ms: i64,
    ) -> zbus::Result<()>;

    async fn register(
        &self,
        full_name: &str,
        student_id: &str,
        school_email: &str,
        face_front: Vec<u8>,
        face_left: Vec<u8>,
        face_right: Vec<u8>,
        face_up: Vec<u8>,
        face_down: Vec<u8>,
    ) -> zbus::Result<String>;

    async fn list_students(&self) -> zbus::Result<String>;

    async fn get_student(&self, student_id: &str) -> zbus::Result<String>;

    async fn project(&self, query: &str, status: &str) -> zbus::Result<String>;

    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Classroom attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a student from a directory of capture images
    Register {
        /// Full name of the student
        #[arg(long)]
        name: String,
        /// Externally assigned student id
        #[arg(long)]
        id: String,
        /// School email address
        #[arg(long)]
        email: String,
        /// Directory containing front/left/right/up/down.{jpg,jpeg,png}
        #[arg(long)]
        captures: PathBuf,
    },
    /// Push a recognized-identity event to the live ledger
    Push {
        /// Student id reported by the recognizer
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
        /// Mark the arrival as late instead of present
        #[arg(long)]
        late: bool,
        /// Arrival time as epoch milliseconds (default: now)
        #[arg(long)]
        at_ms: Option<i64>,
    },
    /// List enrolled students, newest first
    List,
    /// Show one enrolled student
    Show {
        /// Student id
        id: String,
    },
    /// Current live view, optionally filtered
    Live {
        /// Case-insensitive substring matched against name, id, email
        #[arg(long, default_value = "")]
        query: String,
        /// One of: all, present, late
        #[arg(long, default_value = "all")]
        status: String,
    },
    /// Show daemon status
    Status,
}

/// Find the capture for one angle, trying the supported extensions.
fn read_capture(dir: &Path, angle: Angle) -> Result<Vec<u8>> {
    for ext in ["jpg", "jpeg", "png"] {
        let path = dir.join(format!("{angle}.{ext}"));
        if path.is_file() {
            return std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()));
        }
    }
    bail!(
        "no capture for angle '{angle}' in {} (expected {angle}.jpg, {angle}.jpeg, or {angle}.png)",
        dir.display()
    )
}

/// Re-indent a JSON reply from the daemon for the terminal.
fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon sent invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("connecting to rollcalld")?;

    match cli.command {
        Commands::Register {
            name,
            id,
            email,
            captures,
        } => {
            let front = read_capture(&captures, Angle::Front)?;
            let left = read_capture(&captures, Angle::Left)?;
            let right = read_capture(&captures, Angle::Right)?;
            let up = read_capture(&captures, Angle::Up)?;
            let down = read_capture(&captures, Angle::Down)?;

            let raw = proxy
                .register(&name, &id, &email, front, left, right, up, down)
                .await?;
            let reply: serde_json::Value = serde_json::from_str(&raw)?;
            if reply["ok"].as_bool() == Some(true) {
                println!("enrolled {id}");
            } else {
                bail!(
                    "enrollment rejected ({}): {}",
                    reply["error_class"].as_str().unwrap_or("server"),
                    reply["message"].as_str().unwrap_or("unknown error")
                );
            }
        }
        Commands::Push {
            id,
            name,
            email,
            avatar,
            late,
            at_ms,
        } => {
            let status = if late { "late" } else { "present" };
            proxy
                .push_presence(
                    &id,
                    name.as_deref().unwrap_or(""),
                    email.as_deref().unwrap_or(""),
                    avatar.as_deref().unwrap_or(""),
                    status,
                    at_ms.unwrap_or(0),
                )
                .await?;
            println!("pushed {id} ({status})");
        }
        Commands::List => print_json(&proxy.list_students().await?)?,
        Commands::Show { id } => print_json(&proxy.get_student(&id).await?)?,
        Commands::Live { query, status } => print_json(&proxy.project(&query, &status).await?)?,
        Commands::Status => print_json(&proxy.status().await?)?,
    }

    Ok(())
}
