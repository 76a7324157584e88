//! Purpose: Hold top-level CLI command dispatch for `refl-index`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command writes exactly one JSON value (or one human report) to stdout.
//! Invariants: Helpers in `main.rs` remain the source of command business logic.

use super::*;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "refl-index", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Build {
            files,
            output,
            relaxed_keys,
            skip_buffer,
        } => {
            if output.is_some() && files.len() != 1 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--output needs exactly one input file")
                    .with_hint("Drop --output to write <file>.idx next to each input."));
            }
            let options = build_options(relaxed_keys, skip_buffer.as_deref())?;
            if let [source] = files.as_slice() {
                let entry = build_and_save(&IndexBuilder::new(options), source, output.as_deref())?;
                emit_json(json!({ "indexes": [entry] }), color_mode);
                return Ok(RunOutcome::ok());
            }

            let (entries, first_failure) = build_many(&files, options);
            emit_json(json!({ "indexes": entries }), color_mode);
            Ok(match first_failure {
                Some(kind) => RunOutcome::with_code(to_exit_code(kind)),
                None => RunOutcome::ok(),
            })
        }
        Command::Info { index, json } => {
            let loaded = SidecarIndex::load(&index)?;
            if json {
                emit_json(index_info_json(&loaded, &index), color_mode);
            } else {
                emit_index_info_pretty(&loaded, &index);
            }
            Ok(RunOutcome::ok())
        }
        Command::Read {
            index,
            columns,
            start,
            stop,
            head,
            source,
            ignore_mtime,
        } => {
            let loaded = SidecarIndex::load(&index)?;
            let source = resolve_source_path(&loaded, &index, source.as_deref());
            let rows = resolve_rows(start, stop, head, loaded.nrows())?;
            let options = ReaderOptions {
                verify_modified: !ignore_mtime,
            };
            let values = read_rows(&loaded, &source, &columns, rows.clone(), options)?;
            emit_json(
                json!({
                    "index": index.display().to_string(),
                    "source": source.display().to_string(),
                    "start": rows.start,
                    "stop": rows.end,
                    "columns": values,
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Check { index, source } => {
            let loaded = SidecarIndex::load(&index)?;
            let source = resolve_source_path(&loaded, &index, source.as_deref());
            let (value, current) = check_json(&loaded, &index, &source)?;
            emit_json(value, color_mode);
            if current {
                Ok(RunOutcome::ok())
            } else {
                Ok(RunOutcome::with_code(to_exit_code(ErrorKind::StaleIndex)))
            }
        }
    }
}
