//! Line-command interpreter over a single sheet.
//!
//! One command per line. Rejected edits print an `error:` line and the
//! session continues; only I/O failures abort.

use std::io::{self, Write};

use serde::Serialize;

use tabula_engine::{Position, Sheet, SheetError, Value};

pub const HELP: &str = "\
commands:
  set <cell> <text>   set a cell (text, or =formula)
  clear <cell>        clear a cell
  get <cell>          evaluated value
  text <cell>         editable source form
  refs <cell>         cells the formula references
  size                printable extent (rows x cols)
  values              tab-separated evaluated grid
  texts               tab-separated source grid
  dump                JSON of the printable region
  stats               cell and evaluation counters
  quit                exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { pos: Position, text: String },
    Clear { pos: Position },
    Get { pos: Position },
    Text { pos: Position },
    Refs { pos: Position },
    Size,
    Values,
    Texts,
    Dump,
    Stats,
    Help,
    Quit,
}

impl Command {
    /// Parse a line. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim_start()),
            None => (line, ""),
        };
        let command = match word {
            "set" => {
                let (cell, text) = match rest.split_once(char::is_whitespace) {
                    Some((cell, text)) => (cell, text),
                    None => (rest, ""),
                };
                Command::Set {
                    pos: parse_pos(cell)?,
                    text: text.to_string(),
                }
            }
            "clear" => Command::Clear { pos: parse_pos(rest)? },
            "get" => Command::Get { pos: parse_pos(rest)? },
            "text" => Command::Text { pos: parse_pos(rest)? },
            "refs" => Command::Refs { pos: parse_pos(rest)? },
            "size" => Command::Size,
            "values" => Command::Values,
            "texts" => Command::Texts,
            "dump" => Command::Dump,
            "stats" => Command::Stats,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(Some(command))
    }
}

fn parse_pos(s: &str) -> Result<Position, String> {
    Position::parse(s).ok_or_else(|| format!("not a cell reference: {:?}", s))
}

/// What one command did to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Continue,
    /// A sheet error was reported (the session continues).
    Failed,
    Quit,
}

#[derive(Serialize)]
struct DumpCell {
    cell: Position,
    a1: String,
    text: String,
    value: Value,
}

/// Run one command against the sheet, writing output to `out`.
pub fn execute<W: Write>(sheet: &mut Sheet, command: Command, out: &mut W) -> io::Result<Outcome> {
    match command {
        Command::Set { pos, text } => {
            if let Err(e) = sheet.set_cell(pos, &text) {
                return fail(e, out);
            }
        }
        Command::Clear { pos } => {
            if let Err(e) = sheet.clear_cell(pos) {
                return fail(e, out);
            }
        }
        Command::Get { pos } => match sheet.value(pos) {
            Ok(value) => writeln!(out, "{}", value.to_display())?,
            Err(e) => return fail(e, out),
        },
        Command::Text { pos } => match sheet.text(pos) {
            Ok(text) => writeln!(out, "{}", text)?,
            Err(e) => return fail(e, out),
        },
        Command::Refs { pos } => match sheet.referenced_cells(pos) {
            Ok(refs) => {
                let refs: Vec<String> = refs.iter().map(|p| p.to_string()).collect();
                writeln!(out, "{}", refs.join(" "))?;
            }
            Err(e) => return fail(e, out),
        },
        Command::Size => {
            let size = sheet.printable_size();
            writeln!(out, "{}x{}", size.rows, size.cols)?;
        }
        Command::Values => sheet.print_values(out)?,
        Command::Texts => sheet.print_texts(out)?,
        Command::Dump => {
            let cells = dump_cells(sheet);
            let json = serde_json::to_string_pretty(&cells).expect("serializable dump");
            writeln!(out, "{}", json)?;
        }
        Command::Stats => {
            writeln!(
                out,
                "cells={} evals={}",
                sheet.cell_count(),
                sheet.evals_performed()
            )?;
        }
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => return Ok(Outcome::Quit),
    }
    Ok(Outcome::Continue)
}

fn fail<W: Write>(e: SheetError, out: &mut W) -> io::Result<Outcome> {
    writeln!(out, "error: {}", e)?;
    Ok(Outcome::Failed)
}

fn dump_cells(sheet: &mut Sheet) -> Vec<DumpCell> {
    let size = sheet.printable_size();
    let mut cells = Vec::new();
    for row in 0..size.rows {
        for col in 0..size.cols {
            let pos = Position::new(row, col);
            let occupied = matches!(sheet.get_cell(pos), Ok(Some(cell)) if !cell.is_blank());
            if !occupied {
                continue;
            }
            let text = sheet.text(pos).unwrap_or_default();
            let value = sheet.value(pos).unwrap_or(Value::Text(String::new()));
            cells.push(DumpCell {
                cell: pos,
                a1: pos.to_string(),
                text,
                value,
            });
        }
    }
    cells
}
