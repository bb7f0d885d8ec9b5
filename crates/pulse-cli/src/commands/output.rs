//! JSON output and exit-code mapping.

use std::any::Any;

use anyhow::Context;
use pulse_core::{replace_atomic, PulseError};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::{exit_codes, Session};

/// Print `value` as pretty JSON on stdout.
pub fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|_| "{\"error\":\"serialization_failure\"}".to_string())
    );
}

/// Print a minimal error object and return `exit_code`.
pub fn output_error(code: &str, message: &str, exit_code: u8) -> u8 {
    print_json(&json!({
        "error": code,
        "message": message,
    }));
    exit_code
}

/// Report a clap parse failure. Help and version output keep clap's own
/// text and exit code.
pub fn usage_error(err: &clap::Error) -> u8 {
    use clap::error::ErrorKind;

    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            exit_codes::SUCCESS
        },
        _ => output_error(
            "usage_error",
            err.render().to_string().trim(),
            exit_codes::INVALID_INPUT,
        ),
    }
}

/// Reason string for an error that escaped a command.
pub fn runtime_reason(err: &anyhow::Error) -> String {
    err.downcast_ref::<PulseError>().map_or_else(
        || format!("runtime_error:internal:{err:#}"),
        PulseError::runtime_reason,
    )
}

/// Map an error with no report to print: input errors exit 2 with a minimal
/// error object, anything else exits 3.
pub fn fail(err: &anyhow::Error) -> u8 {
    if let Some(pulse) = err.downcast_ref::<PulseError>() {
        if pulse.is_input_error() {
            warn!(error = %format!("{err:#}"), "input error");
            return output_error(pulse.kind(), &format!("{err:#}"), exit_codes::INVALID_INPUT);
        }
    }
    error!(error = %format!("{err:#}"), "runtime error");
    print_json(&json!({
        "error": "runtime_error",
        "message": format!("{err:#}"),
        "strict_fail_count": 1,
        "strict_fail_reasons": [runtime_reason(err)],
    }));
    exit_codes::RUNTIME_ERROR
}

/// Best-effort report for a panic caught at the top level.
pub fn panic_report(payload: &(dyn Any + Send)) -> u8 {
    print_json(&panic_value(payload));
    exit_codes::RUNTIME_ERROR
}

fn panic_value(payload: &(dyn Any + Send)) -> Value {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(%message, "panic");
    json!({
        "error": "runtime_error",
        "message": message,
        "strict_fail_count": 1,
        "strict_fail_reasons": [format!("runtime_error:panic:{message}")],
    })
}

fn push_reason(value: &mut Value, reason: String) {
    if let Some(object) = value.as_object_mut() {
        let reasons = object
            .entry("strict_fail_reasons")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(list) = reasons.as_array_mut() {
            list.push(Value::String(reason));
            let count = list.len();
            object.insert("strict_fail_count".to_string(), Value::from(count));
        }
    }
}

fn has_reasons(value: &Value) -> bool {
    value
        .get("strict_fail_reasons")
        .and_then(Value::as_array)
        .is_some_and(|reasons| !reasons.is_empty())
}

/// Print a report stamped with the session's `strict` flag, persist it to
/// `--out`, and pick the exit code.
///
/// `failure` is an error hit after the report was computed; it is recorded
/// as a runtime reason on the report and forces exit 3.
pub fn finish(session: &Session, report: &impl Serialize, failure: Option<anyhow::Error>) -> u8 {
    emit(session, report, failure, true)
}

/// Like [`finish`] but leaves the object unstamped, so a printed digest
/// builds the same heartbeat whether or not `--strict` was given.
pub fn finish_digest(session: &Session, digest: &impl Serialize) -> u8 {
    emit(session, digest, None, false)
}

fn emit(
    session: &Session,
    report: &impl Serialize,
    failure: Option<anyhow::Error>,
    stamp_strict: bool,
) -> u8 {
    let mut value = match serde_json::to_value(report) {
        Ok(value) => value,
        Err(err) => return fail(&anyhow::Error::new(PulseError::from(err))),
    };
    if stamp_strict {
        if let Some(object) = value.as_object_mut() {
            object.insert("strict".to_string(), Value::Bool(session.strict));
        }
    }

    let mut runtime_failure = false;
    if let Some(err) = failure {
        error!(error = %format!("{err:#}"), "runtime error after evaluation");
        push_reason(&mut value, runtime_reason(&err));
        runtime_failure = true;
    }
    if let Some(out) = &session.out {
        let persisted = serde_json::to_vec_pretty(&value)
            .map_err(anyhow::Error::from)
            .and_then(|mut bytes| {
                bytes.push(b'\n');
                replace_atomic(out, &bytes)
                    .with_context(|| format!("writing report to {}", out.display()))
            });
        if let Err(err) = persisted {
            error!(error = %format!("{err:#}"), "report not persisted");
            push_reason(&mut value, runtime_reason(&err));
            runtime_failure = true;
        }
    }

    print_json(&value);
    if runtime_failure {
        exit_codes::RUNTIME_ERROR
    } else if session.strict && has_reasons(&value) {
        exit_codes::STRICT_FAILURE
    } else {
        exit_codes::SUCCESS
    }
}
