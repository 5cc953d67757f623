//! Interactive operator console.
//!
//! One operator, one session, one selected product. Each input line is parsed
//! into a [`Command`], executed against the [`Orchestrator`], and answered
//! with text. Failed commands print the error kind and leave the ledger as it
//! was.

use crate::access::Session;
use crate::cipher::PayloadCipher;
use crate::custody::{CustodyRecord, LedgerStore, ProductId};
use crate::error::{PipelineError, Result};
use crate::ids::{IntrusionDetector, format_report};
use crate::lifecycle::Orchestrator;
use crate::zones::ZoneStore;
use std::io::{BufRead, Write};
use std::path::PathBuf;

const PROMPT: &str = "eo-custody> ";

const HELP: &str = "\
Commands:
  login <identity>     Open a session
  logout               Close the session
  scan [--faulty]      Acquire a new product (--faulty injects a dead pixel)
  select <id>          Make <id> the current product
  ingest [id]          GENERATED -> INGESTED
  process [id]         INGESTED -> PROCESSED (quality gate + calibration)
  archive [id]         PROCESSED -> ARCHIVED (encrypt + backup)
  hack [id]            Simulate an insider overwriting the archive
  recover [id]         Verify the archive and restore it from backup
  verify [id]          Check the archive fingerprint without changing anything
  retrieve <path> [id] Decrypt the archived product into <path>
  status [id]          Show the session and the product's custody record
  list                 Show every product in the ledger
  audit                Run intrusion detection over the audit trail
  reset                Wipe simulated storage and the ledger
  help                 Show this table
  exit                 Leave the console";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(String),
    Logout,
    Scan { faulty: bool },
    Select(ProductId),
    Ingest(Option<ProductId>),
    Process(Option<ProductId>),
    Archive(Option<ProductId>),
    Hack(Option<ProductId>),
    Recover(Option<ProductId>),
    Verify(Option<ProductId>),
    Retrieve {
        path: PathBuf,
        id: Option<ProductId>,
    },
    Status(Option<ProductId>),
    List,
    Audit,
    Reset,
    Help,
    Exit,
}

impl Command {
    /// Parse one input line. Keywords are case-insensitive; ids and paths are
    /// taken verbatim.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] for blank lines, unknown commands, and
    /// missing or surplus arguments.
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Err(PipelineError::Validation("empty command".to_owned()));
        };
        let args: Vec<&str> = words.collect();
        let keyword = keyword.to_ascii_lowercase();

        let command = match keyword.as_str() {
            "login" => match args.as_slice() {
                [identity] => Self::Login((*identity).to_owned()),
                _ => return Err(usage("login <identity>")),
            },
            "logout" => no_args(&args, Self::Logout)?,
            "scan" => match args.as_slice() {
                [] => Self::Scan { faulty: false },
                ["--faulty"] => Self::Scan { faulty: true },
                _ => return Err(usage("scan [--faulty]")),
            },
            "select" => match args.as_slice() {
                [id] => Self::Select(ProductId::parse(id)?),
                _ => return Err(usage("select <id>")),
            },
            "ingest" => Self::Ingest(optional_id(&args, "ingest [id]")?),
            "process" => Self::Process(optional_id(&args, "process [id]")?),
            "archive" => Self::Archive(optional_id(&args, "archive [id]")?),
            "hack" => Self::Hack(optional_id(&args, "hack [id]")?),
            "recover" => Self::Recover(optional_id(&args, "recover [id]")?),
            "verify" => Self::Verify(optional_id(&args, "verify [id]")?),
            "status" => Self::Status(optional_id(&args, "status [id]")?),
            "retrieve" => match args.as_slice() {
                [path] => Self::Retrieve {
                    path: PathBuf::from(path),
                    id: None,
                },
                [path, id] => Self::Retrieve {
                    path: PathBuf::from(path),
                    id: Some(ProductId::parse(id)?),
                },
                _ => return Err(usage("retrieve <path> [id]")),
            },
            "list" => no_args(&args, Self::List)?,
            "audit" => no_args(&args, Self::Audit)?,
            "reset" => no_args(&args, Self::Reset)?,
            "help" | "?" => Self::Help,
            "exit" | "quit" => Self::Exit,
            other => {
                return Err(PipelineError::Validation(format!(
                    "unknown command '{other}' (try 'help')"
                )));
            }
        };
        Ok(command)
    }
}

fn usage(form: &str) -> PipelineError {
    PipelineError::Validation(format!("usage: {form}"))
}

fn no_args(args: &[&str], command: Command) -> Result<Command> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(PipelineError::Validation(format!(
            "unexpected argument '{}'",
            args.join(" ")
        )))
    }
}

fn optional_id(args: &[&str], form: &str) -> Result<Option<ProductId>> {
    match args {
        [] => Ok(None),
        [id] => ProductId::parse(id).map(Some),
        _ => Err(usage(form)),
    }
}

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Continue(String),
    Exit(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Continue(text) | Self::Exit(text) => text,
        }
    }
}

pub struct Console<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    pipeline: Orchestrator<Z, L, C>,
    detector: IntrusionDetector,
    session: Option<Session>,
    selected: Option<ProductId>,
}

impl<Z, L, C> Console<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    pub fn new(pipeline: Orchestrator<Z, L, C>, detector: IntrusionDetector) -> Self {
        Self {
            pipeline,
            detector,
            session: None,
            selected: None,
        }
    }

    pub fn pipeline(&self) -> &Orchestrator<Z, L, C> {
        &self.pipeline
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn selected(&self) -> Option<&ProductId> {
        self.selected.as_ref()
    }

    /// Read commands from `input` until `exit` or end of input.
    ///
    /// # Errors
    ///
    /// Only terminal I/O errors end the loop; command failures are printed.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> std::io::Result<()> {
        writeln!(
            output,
            "EO custody console. Type 'help' for commands, 'login <identity>' to start."
        )?;
        write!(output, "{PROMPT}")?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                let reply = self.execute(&line);
                writeln!(output, "{}", reply.text())?;
                if matches!(reply, Reply::Exit(_)) {
                    return Ok(());
                }
            }
            write!(output, "{PROMPT}")?;
            output.flush()?;
        }

        writeln!(output)?;
        Ok(())
    }

    /// Parse and run one line.
    pub fn execute(&mut self, line: &str) -> Reply {
        match Command::parse(line) {
            Ok(command) => self.handle(command),
            Err(e) => Reply::Continue(render_error(&e)),
        }
    }

    pub fn handle(&mut self, command: Command) -> Reply {
        match command {
            Command::Exit => {
                self.session = None;
                Reply::Exit("Session closed. Goodbye.".to_owned())
            }
            command => match self.dispatch(command) {
                Ok(text) => Reply::Continue(text),
                Err(e) => Reply::Continue(render_error(&e)),
            },
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<String> {
        match command {
            Command::Login(identity) => {
                let session = self.pipeline.access().login(&identity)?;
                let text = format!("Logged in as '{}' ({})", session.identity, session.role);
                self.session = Some(session);
                Ok(text)
            }
            Command::Logout => Ok(match self.session.take() {
                Some(session) => format!("Logged out '{}'", session.identity),
                None => "No active session".to_owned(),
            }),
            Command::Scan { faulty } => {
                let id = self.pipeline.scan(self.active()?, faulty)?;
                self.selected = Some(id.clone());
                Ok(format!("Acquired {id} (selected)"))
            }
            Command::Select(id) => {
                let record = self.pipeline.record(&id)?;
                self.selected = Some(id);
                Ok(format!("Selected {} [{}]", record.id, record.status))
            }
            Command::Ingest(id) => {
                let id = self.target(id)?;
                let record = self.pipeline.ingest(self.active()?, &id)?;
                Ok(transition_line(&record))
            }
            Command::Process(id) => {
                let id = self.target(id)?;
                let record = self.pipeline.process(self.active()?, &id)?;
                Ok(transition_line(&record))
            }
            Command::Archive(id) => {
                let id = self.target(id)?;
                let record = self.pipeline.archive(self.active()?, &id)?;
                Ok(transition_line(&record))
            }
            Command::Hack(id) => {
                let id = self.target(id)?;
                let record = self.pipeline.inject_fault(self.active()?, &id)?;
                Ok(format!(
                    "{}\nArchive ciphertext of {id} has been overwritten",
                    transition_line(&record)
                ))
            }
            Command::Recover(id) => {
                let id = self.target(id)?;
                let report = self.pipeline.recover(self.active()?, &id)?;
                let how = if report.outcome.was_restored() {
                    "restored from backup"
                } else {
                    "verified healthy, nothing to restore"
                };
                Ok(format!("{} ({how})", transition_line(&report.record)))
            }
            Command::Verify(id) => {
                let id = self.target(id)?;
                Ok(self.pipeline.verify(self.active()?, &id)?.format_cli())
            }
            Command::Retrieve { path, id } => {
                let id = self.target(id)?;
                let plaintext = self.pipeline.retrieve(self.active()?, &id)?;
                std::fs::write(&path, &plaintext)?;
                Ok(format!(
                    "Wrote {} decrypted bytes of {id} to {}",
                    plaintext.len(),
                    path.display()
                ))
            }
            Command::Status(id) => Ok(self.status(id)),
            Command::List => self.list(),
            Command::Audit => {
                let incidents = self.detector.analyze(&self.pipeline.audit().entries());
                Ok(format_report(&incidents))
            }
            Command::Reset => {
                self.pipeline.reset(self.active()?)?;
                self.selected = None;
                Ok("Simulated storage and ledger wiped".to_owned())
            }
            Command::Help => Ok(HELP.to_owned()),
            Command::Exit => Ok(String::new()),
        }
    }

    fn active(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| PipelineError::AuthorizationDenied {
            identity: "anonymous".to_owned(),
            action: "no active session; use 'login <identity>'".to_owned(),
        })
    }

    fn target(&self, id: Option<ProductId>) -> Result<ProductId> {
        id.or_else(|| self.selected.clone()).ok_or_else(|| {
            PipelineError::Validation("no product selected; use 'scan' or 'select <id>'".to_owned())
        })
    }

    fn status(&self, id: Option<ProductId>) -> String {
        let mut out = match &self.session {
            Some(session) => format!("Session: '{}' ({})\n", session.identity, session.role),
            None => "Session: none\n".to_owned(),
        };

        let Some(id) = id.or_else(|| self.selected.clone()) else {
            out.push_str("Product: none selected");
            return out;
        };

        match self.pipeline.record(&id) {
            Ok(record) => out.push_str(&describe(&record)),
            Err(e) => out.push_str(&render_error(&e)),
        }
        out
    }

    fn list(&self) -> Result<String> {
        let records = self.pipeline.list()?;
        if records.is_empty() {
            return Ok("Ledger is empty".to_owned());
        }

        let mut out = format!("{} product(s):\n", records.len());
        for record in &records {
            let marker = if self.selected.as_ref() == Some(&record.id) {
                '*'
            } else {
                ' '
            };
            out.push_str(&format!(
                "{marker} {:<16} {:<10} {}\n",
                record.id.as_str(),
                record.status.as_str(),
                record.payload_location
            ));
        }
        Ok(out.trim_end().to_owned())
    }
}

fn transition_line(record: &CustodyRecord) -> String {
    format!("{} -> {} ({})", record.id, record.status, record.payload_location)
}

fn describe(record: &CustodyRecord) -> String {
    let short = |fp: Option<crate::integrity::Fingerprint>| {
        fp.map_or_else(|| "-".to_owned(), |fp| fp.short())
    };

    let mut out = format!(
        "Product: {}\n  Status:      {}\n  Location:    {}\n  Ingest:      {}\n  Processed:   {}\n  Archive:     {}\n  Label:       {}\n  History:",
        record.id,
        record.status,
        record.payload_location,
        short(record.fingerprint_ingest),
        short(record.fingerprint_processed),
        short(record.fingerprint_archive),
        record.confidentiality_label.as_deref().unwrap_or("-"),
    );
    for event in &record.history {
        out.push_str(&format!(
            "\n    {} {:<10} by {} ({})",
            event.at.format("%Y-%m-%d %H:%M:%S"),
            event.status.as_str(),
            event.actor,
            event.note
        ));
    }
    out
}

fn render_error(e: &PipelineError) -> String {
    format!("[{}] {e}", e.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessController;
    use crate::cipher::AesGcmCipher;
    use crate::custody::{MemoryLedger, ProductStatus};
    use crate::lifecycle::LifecycleOptions;
    use crate::zones::MemoryZoneStore;
    use std::io::Cursor;
    use std::sync::Arc;

    type TestConsole = Console<MemoryZoneStore, MemoryLedger, AesGcmCipher>;

    fn console() -> TestConsole {
        let pipeline = Orchestrator::new(
            Arc::new(MemoryZoneStore::new()),
            MemoryLedger::new(),
            AesGcmCipher::generate(),
            AccessController::default(),
            LifecycleOptions::default(),
        );
        Console::new(pipeline, IntrusionDetector::new(vec!["eve_hacker".to_owned()]))
    }

    fn ok(reply: &Reply) -> &str {
        let text = reply.text();
        assert!(!text.starts_with('['), "unexpected error reply: {text}");
        text
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("LOGIN bob_analyst").unwrap(),
            Command::Login("bob_analyst".to_owned())
        );
        assert_eq!(
            Command::parse("scan --faulty").unwrap(),
            Command::Scan { faulty: true }
        );
        assert_eq!(Command::parse("  ingest ").unwrap(), Command::Ingest(None));
        assert_eq!(
            Command::parse("recover S2_L0_abc123").unwrap(),
            Command::Recover(Some(ProductId::from("S2_L0_abc123")))
        );
        assert_eq!(
            Command::parse("retrieve out.bin").unwrap(),
            Command::Retrieve {
                path: PathBuf::from("out.bin"),
                id: None
            }
        );
        assert_eq!(Command::parse("quit").unwrap(), Command::Exit);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for line in ["", "dance", "login", "login a b", "scan --fast", "list all", "select ../x"] {
            assert!(
                matches!(Command::parse(line), Err(PipelineError::Validation(_))),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn test_commands_need_a_session() {
        let mut console = console();
        let reply = console.execute("scan");
        assert!(reply.text().starts_with("[AuthorizationDenied]"));
        assert!(console.pipeline().list().unwrap().is_empty());
    }

    #[test]
    fn test_happy_path_through_console() {
        let mut console = console();
        ok(&console.execute("login emanuele_admin"));
        ok(&console.execute("scan"));
        let id = console.selected().cloned().unwrap();

        ok(&console.execute("ingest"));
        ok(&console.execute("process"));
        assert!(ok(&console.execute("archive")).contains("ARCHIVED"));
        assert!(ok(&console.execute("verify")).contains("PASS"));

        let status = console.execute("status");
        assert!(ok(&status).contains(id.as_str()));
        assert!(status.text().contains("encrypted"));
        assert_eq!(
            console.pipeline().record(&id).unwrap().status,
            ProductStatus::Archived
        );
    }

    #[test]
    fn test_blocked_actor_and_audit_report() {
        let mut console = console();
        ok(&console.execute("login emanuele_admin"));
        ok(&console.execute("scan"));
        ok(&console.execute("ingest"));
        ok(&console.execute("process"));

        ok(&console.execute("login charlie_user"));
        let reply = console.execute("archive");
        assert!(reply.text().starts_with("[AuthorizationDenied]"));

        let reply = console.execute("login eve_hacker");
        assert!(reply.text().starts_with("[AuthorizationDenied]"));
        assert_eq!(console.session().unwrap().identity, "charlie_user");

        let report = console.execute("audit");
        assert!(ok(&report).contains("HIGH"));
        assert!(report.text().contains("MEDIUM"));
    }

    #[test]
    fn test_list_and_status_rendering() {
        let mut console = console();
        for line in ["login emanuele_admin", "scan", "ingest"] {
            ok(&console.execute(line));
        }

        let reply = console.execute("list");
        let listing = ok(&reply);
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.lines().nth(1).unwrap().starts_with("* S2_L0_"));
        assert!(listing.contains("INGESTED"));

        let reply = console.execute("status");
        let status = ok(&reply);
        assert_eq!(status.matches(" by emanuele_admin ").count(), 2);
        assert!(!status.ends_with('\n'));
    }

    #[test]
    fn test_hack_and_recover() {
        let mut console = console();
        for line in ["login emanuele_admin", "scan", "ingest", "process", "archive", "hack"] {
            ok(&console.execute(line));
        }
        assert!(console.execute("verify").text().contains("FAIL"));
        assert!(ok(&console.execute("recover")).contains("restored from backup"));
        assert!(console.execute("verify").text().contains("PASS"));
    }

    #[test]
    fn test_retrieve_writes_plaintext() {
        let temp = tempfile::TempDir::new().unwrap();
        let out = temp.path().join("product.bin");
        let mut console = console();
        for line in ["login bob_analyst", "scan", "ingest", "process", "archive"] {
            ok(&console.execute(line));
        }

        ok(&console.execute(&format!("retrieve {}", out.display())));
        assert_eq!(
            std::fs::metadata(&out).unwrap().len(),
            crate::source::PAYLOAD_LEN as u64
        );
    }

    #[test]
    fn test_select_unknown_product() {
        let mut console = console();
        let reply = console.execute("select S2_L0_missing");
        assert!(reply.text().starts_with("[ResourceMissing]"));
        assert!(console.selected().is_none());
    }

    #[test]
    fn test_run_loop_stops_at_exit() {
        let mut console = console();
        let input = Cursor::new("login emanuele_admin\n\nlist\nexit\nscan\n");
        let mut output = Vec::new();

        console.run(input, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("Logged in as 'emanuele_admin' (admin)"));
        assert!(text.contains("Ledger is empty"));
        assert!(text.contains("Goodbye"));
        assert!(console.pipeline().list().unwrap().is_empty());
        assert!(console.session().is_none());
    }
}
