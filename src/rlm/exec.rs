//! Exploration sandbox: a persistent Python namespace on a dedicated thread.
//!
//! The lexical screen in [`screen`] is a best-effort guard that only stops a
//! snippet from *naming* a denied capability. It is not a security boundary;
//! the interpreter runs in-process with no syscall restrictions.

use std::collections::BTreeSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use pyo3::prelude::*;
use pyo3::types::{PyCFunction, PyDict, PyList, PyTuple};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use super::error::ExecError;
use super::oracle::{within, ReadingOracle};

/// Identifiers a snippet may not mention at all.
pub const DENYLIST: &[&str] = &[
    // process / OS
    "os", "sys", "subprocess", "shutil", "signal", "ctypes", "multiprocessing", "threading",
    // networking
    "socket", "urllib", "requests", "http", "ftplib", "smtplib", "asyncio",
    // file I/O and serialization
    "open", "io", "pathlib", "pickle", "shelve", "marshal", "input",
    // code evaluation
    "eval", "exec", "compile", "__import__", "importlib", "breakpoint",
    // introspection
    "globals", "locals", "vars", "__builtins__", "__globals__", "__subclasses__", "__code__",
    "__dict__", "getattr", "setattr", "delattr",
    // exits
    "exit", "quit",
];

/// Builtins copied into the restricted namespace.
pub const ALLOWED: &[&str] = &[
    "print", "len", "str", "int", "float", "bool", "list", "dict", "set", "tuple", "range",
    "enumerate", "zip", "map", "filter", "sorted", "min", "max", "sum", "abs", "round", "any",
    "all", "isinstance", "type", "reversed", "repr", "True", "False", "None", "Exception",
    "ValueError", "KeyError", "IndexError", "TypeError",
];

/// Builtins explicitly shadowed with `None`.
pub const BLOCKED: &[&str] = &[
    "__import__", "eval", "exec", "compile", "open", "input", "globals", "locals", "vars",
    "breakpoint", "getattr", "setattr", "delattr", "exit", "quit",
];

/// Reject a snippet that names a denied capability. Runs before anything is
/// sent to the interpreter, so a rejected snippet has no effect at all.
pub fn screen(code: &str) -> Result<(), ExecError> {
    let denied = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|tok| !tok.is_empty())
        .find(|tok| DENYLIST.contains(tok));
    match denied {
        Some(tok) => Err(ExecError::Rejected {
            capability: tok.to_string(),
        }),
        None => Ok(()),
    }
}

/// Values registered in the namespace before the first snippet runs.
#[derive(Debug, Clone, Default)]
pub struct SandboxSeed {
    pub question: String,
    pub segments: Vec<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Everything the snippet printed, including output before a failure.
    pub output: String,
    pub error: Option<ExecError>,
    /// Top-level names that did not exist before this snippet ran.
    pub names_introduced: Vec<String>,
    /// The raw contents of `explored` after the snippet ran.
    pub explored: Vec<i64>,
}

impl ExecutionResult {
    fn failed(error: ExecError) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
            names_introduced: Vec::new(),
            explored: Vec::new(),
        }
    }
}

enum Request {
    Execute {
        code: String,
        reply: mpsc::Sender<ExecutionResult>,
    },
    Sync {
        findings: Vec<String>,
        explored: Vec<usize>,
        reply: mpsc::Sender<Result<(), ExecError>>,
    },
}

/// Handle to the interpreter thread. Namespace contents survive across
/// `execute` calls for the life of the handle.
pub struct Sandbox {
    tx: mpsc::Sender<Request>,
}

impl Sandbox {
    pub fn spawn(seed: SandboxSeed, reader: Arc<dyn ReadingOracle>, oracle_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Request>();

        std::thread::spawn(move || {
            // The interpreter thread stays outside any tokio context: it
            // blocks on a std channel, and `ask_oracle` drives its own
            // runtime with `block_on`.
            let bridge_rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => Arc::new(rt),
                Err(e) => {
                    warn!("Failed to create sandbox bridge runtime: {}", e);
                    return;
                }
            };

            let globals = match Python::with_gil(|py| -> PyResult<Py<PyDict>> {
                let globals = PyDict::new(py);
                setup_restricted_builtins(py, &globals)?;
                inject_environment(py, &globals, &seed, reader, bridge_rt, oracle_timeout)?;
                Ok(globals.unbind())
            }) {
                Ok(g) => g,
                Err(e) => {
                    warn!("Failed to initialize sandbox namespace: {}", e);
                    return;
                }
            };
            debug!(segments = seed.segments.len(), "Sandbox initialized");

            while let Ok(req) = rx.recv() {
                Python::with_gil(|py| {
                    let globals = globals.bind(py);
                    match req {
                        Request::Execute { code, reply } => {
                            let _ = reply.send(execute_in_globals(py, globals, &code));
                        }
                        Request::Sync {
                            findings,
                            explored,
                            reply,
                        } => {
                            let result = sync_state(py, globals, &findings, &explored)
                                .map_err(|e| ExecError::Runtime(e.to_string()));
                            let _ = reply.send(result);
                        }
                    }
                });
            }
            debug!("Sandbox shutting down");
        });

        Self { tx }
    }

    /// Run one snippet. Never panics and never returns `Err`: every failure
    /// comes back as an unsuccessful result.
    pub async fn execute(&self, code: &str) -> ExecutionResult {
        if let Err(rejected) = screen(code) {
            debug!(error = %rejected, "Snippet rejected before execution");
            return ExecutionResult::failed(rejected);
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        let sent = self.tx.send(Request::Execute {
            code: code.to_string(),
            reply: reply_tx,
        });
        if sent.is_err() {
            return ExecutionResult::failed(ExecError::Unavailable("sandbox thread died".into()));
        }

        match tokio::task::spawn_blocking(move || reply_rx.recv()).await {
            Ok(Ok(result)) => result,
            _ => ExecutionResult::failed(ExecError::Unavailable("sandbox reply channel closed".into())),
        }
    }

    /// Overwrite `findings` and `explored` in the namespace with the
    /// session's copies.
    pub async fn sync(&self, findings: Vec<String>, explored: Vec<usize>) -> Result<(), ExecError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Request::Sync {
                findings,
                explored,
                reply: reply_tx,
            })
            .map_err(|_| ExecError::Unavailable("sandbox thread died".into()))?;

        tokio::task::spawn_blocking(move || reply_rx.recv())
            .await
            .map_err(|e| ExecError::Unavailable(e.to_string()))?
            .map_err(|_| ExecError::Unavailable("sandbox reply channel closed".into()))?
    }
}

fn top_level_names(globals: &Bound<'_, PyDict>) -> BTreeSet<String> {
    globals
        .keys()
        .iter()
        .filter_map(|k| k.extract::<String>().ok())
        .collect()
}

fn read_explored(globals: &Bound<'_, PyDict>) -> Vec<i64> {
    let Ok(Some(value)) = globals.get_item("explored") else {
        return Vec::new();
    };
    let Ok(items) = value.downcast::<PyList>() else {
        return Vec::new();
    };
    items.iter().filter_map(|i| i.extract::<i64>().ok()).collect()
}

/// Execute code within the persistent namespace, capturing stdout.
fn execute_in_globals(py: Python<'_>, globals: &Bound<'_, PyDict>, code: &str) -> ExecutionResult {
    let before = top_level_names(globals);

    let run = || -> PyResult<(String, Option<PyErr>)> {
        let string_io = py.import("io")?.getattr("StringIO")?.call0()?;
        let sys = py.import("sys")?;
        let old_stdout = sys.getattr("stdout")?;
        sys.setattr("stdout", &string_io)?;

        let result = match std::ffi::CString::new(code.as_bytes()) {
            Ok(code_cstr) => py.run(&code_cstr, Some(globals), None),
            Err(e) => Err(pyo3::exceptions::PyValueError::new_err(format!("invalid code string: {e}"))),
        };

        sys.setattr("stdout", old_stdout)?;
        let output: String = string_io.call_method0("getvalue")?.extract()?;
        Ok((output, result.err()))
    };

    let (output, error) = match run() {
        Ok((output, None)) => (output, None),
        Ok((output, Some(e))) => (output, Some(ExecError::Runtime(e.to_string()))),
        Err(e) => (String::new(), Some(ExecError::Unavailable(e.to_string()))),
    };

    let names_introduced = top_level_names(globals)
        .difference(&before)
        .cloned()
        .collect();

    match &error {
        None => debug!(output_len = output.len(), "Snippet executed successfully"),
        Some(e) => warn!(error = %e, "Snippet failed"),
    }

    ExecutionResult {
        success: error.is_none(),
        output,
        error,
        names_introduced,
        explored: read_explored(globals),
    }
}

fn sync_state(py: Python<'_>, globals: &Bound<'_, PyDict>, findings: &[String], explored: &[usize]) -> PyResult<()> {
    let f = PyList::empty(py);
    for item in findings {
        f.append(item)?;
    }
    globals.set_item("findings", f)?;

    let e = PyList::empty(py);
    for idx in explored {
        e.append(*idx)?;
    }
    globals.set_item("explored", e)?;
    Ok(())
}

/// Set up restricted builtins: allow-list plus explicit `None` shadows.
fn setup_restricted_builtins(py: Python<'_>, globals: &Bound<'_, PyDict>) -> PyResult<()> {
    let builtins = py.import("builtins")?;
    let restricted = PyDict::new(py);

    for name in ALLOWED {
        if let Ok(obj) = builtins.getattr(*name) {
            restricted.set_item(*name, obj)?;
        }
    }

    for name in BLOCKED {
        restricted.set_item(*name, py.None())?;
    }

    globals.set_item("__builtins__", restricted)?;
    Ok(())
}

/// Register the seed values and `ask_oracle(query, text)`.
fn inject_environment(
    py: Python<'_>,
    globals: &Bound<'_, PyDict>,
    seed: &SandboxSeed,
    reader: Arc<dyn ReadingOracle>,
    rt: Arc<Runtime>,
    oracle_timeout: Duration,
) -> PyResult<()> {
    let segments = PyList::empty(py);
    for s in &seed.segments {
        segments.append(s)?;
    }
    globals.set_item("segments", segments)?;

    let keywords = PyList::empty(py);
    for k in &seed.keywords {
        keywords.append(k)?;
    }
    globals.set_item("keywords", keywords)?;
    globals.set_item("question", &seed.question)?;
    sync_state(py, globals, &[], &[])?;

    let ask_oracle = PyCFunction::new_closure(
        py,
        Some(c"ask_oracle"),
        None,
        move |args: &Bound<'_, PyTuple>, _kwargs: Option<&Bound<'_, PyDict>>| -> PyResult<String> {
            let query: String = args.get_item(0)?.extract()?;
            let text: String = args.get_item(1)?.extract()?;
            debug!(query = %query, text_len = text.len(), "Sandbox: ask_oracle");
            let answer = args
                .py()
                .allow_threads(|| rt.block_on(within(oracle_timeout, reader.ask(&query, &text))));
            answer.map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))
        },
    )?;
    globals.set_item("ask_oracle", ask_oracle)?;

    Ok(())
}
