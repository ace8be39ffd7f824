/// Events emitted while a workflow runs.
///
/// A workflow is a sequence of phases. Within a phase, a task may announce a
/// known number of steps and tick through them; for Rietveld refinement each
/// stage is one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,
    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Optional sink for [`Progress`] events. Reporting without a callback is a
/// no-op.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Reports a phase start, runs `body`, then reports the phase finish
    /// whether or not `body` succeeded.
    pub fn phase<T>(&self, name: &'static str, body: impl FnOnce() -> T) -> T {
        self.report(Progress::PhaseStart { name });
        let result = body();
        self.report(Progress::PhaseFinish);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_is_silent() {
        ProgressReporter::new().report(Progress::Message("ignored".into()));
    }

    #[test]
    fn phase_brackets_body_with_start_and_finish() {
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|e: Progress| events.lock().unwrap().push(e)));
        let value = reporter.phase("Scale", || {
            reporter.report(Progress::TaskIncrement);
            7
        });
        drop(reporter);
        assert_eq!(value, 7);
        assert_eq!(
            events.into_inner().unwrap(),
            vec![
                Progress::PhaseStart { name: "Scale" },
                Progress::TaskIncrement,
                Progress::PhaseFinish,
            ]
        );
    }
}
