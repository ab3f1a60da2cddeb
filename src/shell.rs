// src/shell.rs

use inquire::{CustomUserError, InquireError, Text};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;
use crate::line_item::{LineItemDraft, MEASUREMENT_TYPES};
use crate::notice::Notice;
use crate::ocr::{ImageInput, OcrEngine, TesseractEngine};
use crate::session::{ControlState, Session};
use crate::table::{Confirm, Field, RowId};

const HELP: &str = "\
commands:
  show                       print the table and grand totals
  add                        add a row (prompts for each cell)
  edit <row> <field> [value] edit a cell: item, amount, cost, measurement, vendor, notes
  delete <row>               delete a row
  paste                      stage raw text (finish with an empty line)
  input                      print the staged text
  clear-input                empty the staged text
  parse                      extract line items from the staged text
  ocr <image>                recognize text in an image and stage it
  export                     write the table to CSV
  clear-all                  drop the table, staged text and saved data
  units                      list measurement suffixes
  quit";

/// Yes/no prompt on the terminal; anything but an explicit yes declines.
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        inquire::Confirm::new(prompt)
            .with_default(false)
            .prompt()
            .unwrap_or(false)
    }
}

fn measurement_suggestions(input: &str) -> Result<Vec<String>, CustomUserError> {
    let needle = input.to_uppercase();
    Ok(MEASUREMENT_TYPES
        .iter()
        .filter(|m| m.contains(needle.as_str()))
        .map(|m| m.to_string())
        .collect())
}

fn prompt_cell(label: &str, field: Field, initial: &str) -> Result<String, InquireError> {
    let prompt = Text::new(label).with_initial_value(initial);
    if field == Field::Measurement {
        prompt.with_autocomplete(measurement_suggestions).prompt()
    } else {
        prompt.prompt()
    }
}

fn prompt_draft() -> Result<LineItemDraft, InquireError> {
    Ok(LineItemDraft {
        item: Some(prompt_cell("Item", Field::Item, "")?),
        amount: Some(prompt_cell("Amount", Field::Amount, "1")?),
        cost: Some(prompt_cell("Cost (e.g. USD 150 or 2000000)", Field::Cost, "")?),
        measurement: Some(prompt_cell("Measurement", Field::Measurement, "")?),
        vendor: Some(prompt_cell("Vendor", Field::Vendor, "")?),
        notes: Some(prompt_cell("Notes", Field::Notes, "")?),
    })
}

/// Read lines until an empty one.
fn prompt_lines() -> Result<Vec<String>, InquireError> {
    let mut lines = Vec::new();
    loop {
        let l = Text::new("|").prompt()?;
        if l.is_empty() {
            return Ok(lines);
        }
        lines.push(l);
    }
}

/// Esc or Ctrl-C inside a command abandons that command only.
fn unless_cancelled<T>(outcome: Result<T, InquireError>) -> Result<Option<T>, InquireError> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
            println!("cancelled");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn show_notice(notice: &Notice) {
    println!("{notice}");
}

fn drain(notices: &mut mpsc::UnboundedReceiver<Notice>) {
    while let Ok(n) = notices.try_recv() {
        show_notice(&n);
    }
}

pub fn render(session: &Session) -> String {
    let table = session.table();
    if table.is_empty() {
        return "(no rows)".to_string();
    }
    let mut out = format!(
        "{:>4}  {:<24} {:>6}  {:<18} {:<12} {:>18}  {:<16} {:<16} {}\n",
        "ROW", "ITEM", "AMOUNT", "COST", "MEASUREMENT", "TOTAL", "VENDOR", "NOTES", "STATUS"
    );
    for row in table.rows() {
        let l = &row.line;
        out.push_str(&format!(
            "{:>4}  {:<24} {:>6}  {:<18} {:<12} {:>18}  {:<16} {:<16} {}\n",
            row.id,
            l.item,
            l.amount,
            l.cost,
            l.measurement,
            l.rendered_total,
            l.vendor,
            l.notes,
            l.status.as_str()
        ));
    }
    for total in table.grand_totals() {
        out.push_str(&format!("      {:<64} {:>18}\n", total.label(), total.rendered));
    }
    let incomplete = table.rows().iter().filter(|r| !r.line.is_valid()).count();
    if incomplete > 0 {
        out.push_str(&format!("{incomplete} row(s) need item, cost and measurement\n"));
    }
    out
}

fn parse_row_id(arg: Option<&str>) -> Option<RowId> {
    arg.and_then(|a| a.parse().ok())
}

/// Interactive loop over a session until `quit` or end of input.
pub async fn run(session: &mut Session, cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::from_config(&cfg.ocr));
    println!("Shipment costing. Type `help` for commands.");
    println!("{}", render(session));

    loop {
        let line = match Text::new("shipment>").prompt() {
            Ok(line) => line,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
            Err(e) => return Err(e.into()),
        };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        debug!(command, "Shell command");

        match command {
            "help" | "?" => println!("{HELP}"),
            "show" | "ls" => println!("{}", render(session)),
            "units" => println!("{}", MEASUREMENT_TYPES.join("  ")),
            "add" => {
                let Some(draft) = unless_cancelled(prompt_draft())? else {
                    continue;
                };
                let id = session.add_row(draft);
                println!("added row {id}");
                println!("{}", render(session));
            }
            "edit" => {
                let id = parse_row_id(words.next());
                let field = words.next().and_then(Field::parse);
                let (Some(id), Some(field)) = (id, field) else {
                    show_notice(&Notice::error("usage: edit <row> <field> [value]"));
                    continue;
                };
                let rest: Vec<&str> = words.collect();
                let value = if rest.is_empty() {
                    let Some(value) = unless_cancelled(prompt_cell("Value", field, ""))? else {
                        continue;
                    };
                    value
                } else {
                    rest.join(" ")
                };
                match session.edit(id, field, &value) {
                    Ok(line) => println!(
                        "row {id}: total {} ({})",
                        line.rendered_total,
                        line.status.as_str()
                    ),
                    Err(e) => show_notice(&Notice::error(e.to_string())),
                }
            }
            "delete" | "rm" => {
                let Some(id) = parse_row_id(words.next()) else {
                    show_notice(&Notice::error("usage: delete <row>"));
                    continue;
                };
                match session.delete_row(id, &PromptConfirm) {
                    Ok(true) => println!("{}", render(session)),
                    Ok(false) => {}
                    Err(e) => show_notice(&Notice::error(e.to_string())),
                }
            }
            "paste" => {
                let Some(lines) = unless_cancelled(prompt_lines())? else {
                    continue;
                };
                session.set_raw_input(lines.join("\n"));
                println!("staged {} line(s)", lines.len());
            }
            "input" => println!("{}", session.raw_input()),
            "clear-input" => show_notice(&session.clear_input()),
            "parse" => {
                let control = session.parse_control();
                println!("{}", ControlState::BUSY.label);
                let notice = session.parse_with_ai().await;
                show_notice(&notice);
                debug!(control = ?*control.borrow(), "Parse control after request");
                if !notice.is_error() {
                    println!("{}", render(session));
                }
            }
            "ocr" => {
                let Some(path) = words.next() else {
                    show_notice(&Notice::error("usage: ocr <image>"));
                    continue;
                };
                run_ocr(session, engine.clone(), path, Duration::from_millis(cfg.ocr.close_delay_ms)).await;
            }
            "export" => {
                let (notice, path) = session.export(&cfg.export.dir, &cfg.export.file_prefix);
                show_notice(&notice);
                if let Some(path) = path {
                    println!("{}", path.display());
                }
            }
            "clear-all" => {
                if let Some(notice) = session.clear_all(&PromptConfirm) {
                    show_notice(&notice);
                }
            }
            "quit" | "exit" | "q" => break,
            other => show_notice(&Notice::error(format!("unknown command `{other}`, try `help`"))),
        }
    }

    info!(rows = session.table().len(), "Shell closed");
    Ok(())
}

/// Open an OCR context, recognize one image, and on confirmation post the
/// text back into the session's staging field.
async fn run_ocr(session: &mut Session, engine: Arc<dyn OcrEngine>, path: &str, close_delay: Duration) {
    let image = match ImageInput::from_path(path).await {
        Ok(image) => image,
        Err(e) => {
            show_notice(&Notice::error(e.to_string()));
            return;
        }
    };

    let (mut window, mut notices) = session.open_ocr(engine, close_delay);
    let ready = window.wait_until_ready().await;
    drain(&mut notices);
    if ready.is_err() {
        return;
    }

    let recognized = window.recognize(image).await.map(|_| ());
    drain(&mut notices);
    if let Err(e) = recognized {
        show_notice(&Notice::error(e.to_string()));
        return;
    }
    if let Some(preview) = window.preview() {
        println!("{path}: {} ({} bytes)", preview.mime, preview.bytes.len());
    }

    // The recognized text stays editable before it is sent.
    let initial = window.result().trim().to_string();
    match Text::new("OCR result").with_initial_value(&initial).prompt() {
        Ok(edited) => window.set_result(edited),
        Err(_) => {
            window.clear();
            drain(&mut notices);
            return;
        }
    }
    if !PromptConfirm.confirm("Send to main app?") {
        window.clear();
        drain(&mut notices);
        return;
    }
    if let Err(e) = window.send_result().await {
        show_notice(&Notice::error(e.to_string()));
    }
    drain(&mut notices);
    debug!(closed = window.is_closed(), "OCR context finished");
    if let Some(notice) = session.poll_ocr() {
        show_notice(&notice);
    }
}
