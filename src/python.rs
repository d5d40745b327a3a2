//! Python Bindings

use crate::error::KeywardError;
use crate::report::StatusReport;
use crate::{Complexity, ErrorKind, ResourceManager, Task, TaskQueue};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::sync::Arc;

/// Python wrapper for the resource manager
#[pyclass(name = "ResourceManager")]
struct PyResourceManager {
    inner: Arc<ResourceManager>,
    queue: TaskQueue,
    runtime: tokio::runtime::Runtime,
}

#[pymethods]
impl PyResourceManager {
    /// Create a manager, loading keys from `config_path` or the default locations
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        // Load .env file if present, for `key_env` entries
        let _ = dotenvy::dotenv();

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| KeywardError::Internal(format!("Failed to create runtime: {}", e)))?;

        let inner = runtime.block_on(async {
            match config_path {
                Some(path) => ResourceManager::with_config_path(path).await,
                None => ResourceManager::new().await,
            }
        });
        let queue = TaskQueue::from_settings(inner.settings());

        Ok(Self {
            inner: Arc::new(inner),
            queue,
            runtime,
        })
    }

    /// Get a key for `project`, or None when none is usable
    #[pyo3(signature = (project, complexity="normal"))]
    fn acquire_key(&self, py: Python<'_>, project: &str, complexity: &str) -> Option<String> {
        let manager = self.inner.clone();
        let complexity = Complexity::parse(complexity);
        py.detach(|| {
            self.runtime
                .block_on(async move { manager.acquire_key(project, complexity).await })
        })
    }

    /// Report a failed call, e.g. `report_error(key, "rate_limit_reached")`
    fn report_error(&self, key: &str, error_kind: &str) {
        self.inner.report_error(key, ErrorKind::parse(error_kind));
    }

    /// Classify an HTTP failure and report it
    fn report_http_error(&self, key: &str, status: u16, body: &str) -> String {
        let kind = ErrorKind::classify(status, body);
        let name = kind.to_string();
        self.inner.report_error(key, kind);
        name
    }

    fn report_success(&self, key: &str) {
        self.inner.report_success(key);
    }

    /// Per-credential usage as a list of dicts; secrets are masked
    fn status_report(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let report = self.inner.status_report();
        Ok(report_to_py(py, &report)?.into())
    }

    /// Human readable report
    fn report(&self) -> String {
        self.inner.status_report().to_string()
    }

    /// Why `acquire_key` would or would not return a key for `project`
    fn availability(&self, project: &str) -> String {
        self.inner.availability(project).to_string()
    }

    /// Queue a task; higher priority runs first
    #[pyo3(signature = (kind, project, priority=1))]
    fn add_task(&self, kind: &str, project: &str, priority: i32) {
        let task = Task::new(kind, project, priority, self.inner.clock());
        self.runtime.block_on(self.queue.push(task));
    }

    /// Dispatch the head task: a dict with the task and its key, or None
    fn process_next_task(&self, py: Python<'_>) -> PyResult<Option<Py<PyAny>>> {
        let dispatch = py.detach(|| {
            self.runtime
                .block_on(self.queue.process_next(&self.inner))
        });

        match dispatch {
            Some(dispatch) => {
                let dict = PyDict::new(py);
                dict.set_item("type", &dispatch.task.kind)?;
                dict.set_item("project", &dispatch.task.project)?;
                dict.set_item("priority", dispatch.task.priority)?;
                dict.set_item("complexity", dispatch.complexity.to_string())?;
                dict.set_item("key", &dispatch.key)?;
                Ok(Some(dict.into()))
            }
            None => Ok(None),
        }
    }

    fn queue_status(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let status = self.runtime.block_on(self.queue.status());
        let dict = PyDict::new(py);
        dict.set_item("queue_length", status.queue_length)?;
        dict.set_item("high_priority_tasks", status.high_priority_tasks)?;
        Ok(dict.into())
    }
}

fn report_to_py<'py>(py: Python<'py>, report: &StatusReport) -> PyResult<Bound<'py, PyList>> {
    let list = PyList::empty(py);
    for c in &report.credentials {
        let dict = PyDict::new(py);
        dict.set_item("project", &c.project)?;
        dict.set_item("model", &c.model)?;
        dict.set_item("tier", c.tier.to_string())?;
        dict.set_item("key", &c.key_hint)?;
        dict.set_item("consumed", c.consumed)?;
        dict.set_item("limit", c.daily_limit)?;
        dict.set_item("priority", c.priority)?;
        dict.set_item("state", c.state.to_string())?;
        dict.set_item("cooldown_until", c.cooldown_until.map(|t| t.to_rfc3339()))?;
        list.append(dict)?;
    }
    Ok(list)
}

/// Python module definition
#[pymodule]
fn _keyward(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyResourceManager>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
