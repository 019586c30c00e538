//! Core station abstraction and runner for the pipeline workers.

use crate::pipeline::error::{ErrorReporter, StationError};
use crate::pipeline::types::Job;
use crossbeam_channel::{Receiver, Sender};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A processing station in the pipeline.
///
/// Each station receives input, processes it, and produces output.
/// Stations run in their own threads and are connected by channels.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - Successfully processed and produced output
    /// - `Ok(None)` - Successfully processed but no output (e.g., dropped)
    /// - `Err(StationError)` - Processing failed
    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Runs a station in a dedicated thread.
///
/// The thread exits on `Job::Shutdown`, on a fatal error, or when either
/// channel disconnects. The sentinel is consumed, not forwarded: the owner
/// decides when the next stage is told to stop.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<()>>,
    station_name: &'static str,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a new station in a dedicated thread.
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<Job<S::Input>>,
        output_tx: Sender<Job<S::Output>>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let station_name = station.name();

        let handle = thread::spawn(move || {
            Self::run_station(&mut station, input_rx, output_tx, error_reporter);
        });

        Self {
            handle: Some(handle),
            station_name,
            _phantom: PhantomData,
        }
    }

    fn run_station(
        station: &mut S,
        input_rx: Receiver<Job<S::Input>>,
        output_tx: Sender<Job<S::Output>>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) {
        let station_name = station.name();

        while let Ok(job) = input_rx.recv() {
            let input = match job {
                Job::Item(input) => input,
                Job::Shutdown => {
                    tracing::debug!(station = station_name, "shutdown sentinel received");
                    break;
                }
            };

            match station.process(input) {
                Ok(Some(output)) => {
                    if output_tx.send(Job::Item(output)).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(error @ StationError::Recoverable(_)) => {
                    error_reporter.report(station_name, &error);
                }
                Err(error @ StationError::Fatal(_)) => {
                    error_reporter.report(station_name, &error);
                    break;
                }
            }
        }

        station.shutdown();
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<(), String> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name))
        } else {
            Ok(())
        }
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DoublerStation {
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for DoublerStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError> {
            Ok(Some(input * 2))
        }

        fn name(&self) -> &'static str {
            "Doubler"
        }

        fn shutdown(&mut self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
        }
    }

    struct FailingStation {
        fail_on: i32,
        fatal: bool,
    }

    impl Station for FailingStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError> {
            if input == self.fail_on {
                let msg = format!("Failed on {}", input);
                if self.fatal {
                    Err(StationError::Fatal(msg))
                } else {
                    Err(StationError::Recoverable(msg))
                }
            } else if input < 0 {
                Ok(None)
            } else {
                Ok(Some(input))
            }
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    #[derive(Default)]
    struct MockReporter {
        errors: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, station: &str, error: &StationError) {
            let mut errors = self.errors.lock().unwrap();
            errors.push((station.to_string(), error.to_string()));
        }
    }

    fn drain(rx: &Receiver<Job<i32>>) -> Vec<i32> {
        rx.try_iter()
            .filter_map(|job| match job {
                Job::Item(v) => Some(v),
                Job::Shutdown => None,
            })
            .collect()
    }

    #[test]
    fn test_station_runner_stops_on_sentinel() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };
        let runner =
            StationRunner::spawn(station, input_rx, output_tx, Arc::new(MockReporter::default()));
        assert_eq!(runner.name(), "Doubler");

        input_tx.send(Job::Item(1)).unwrap();
        input_tx.send(Job::Item(2)).unwrap();
        input_tx.send(Job::Shutdown).unwrap();
        input_tx.send(Job::Item(3)).unwrap();

        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));

        // Items after the sentinel are never processed and the sentinel is not forwarded
        assert_eq!(drain(&output_rx), vec![2, 4]);
    }

    #[test]
    fn test_station_runner_filtering_and_recoverable_errors() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();

        let station = FailingStation {
            fail_on: 2,
            fatal: false,
        };
        let runner = StationRunner::spawn(station, input_rx, output_tx, reporter);

        for v in [1, 2, -5, 3] {
            input_tx.send(Job::Item(v)).unwrap();
        }
        input_tx.send(Job::Shutdown).unwrap();
        runner.join().unwrap();

        assert_eq!(drain(&output_rx), vec![1, 3]);
        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "Failing");
        assert!(reported[0].1.contains("Failed on 2"));
    }

    #[test]
    fn test_station_runner_fatal_error_stops() {
        let (input_tx, input_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();

        let station = FailingStation {
            fail_on: 2,
            fatal: true,
        };
        let runner = StationRunner::spawn(station, input_rx, output_tx, reporter);

        for v in [1, 2, 3] {
            input_tx.send(Job::Item(v)).unwrap();
        }
        runner.join().unwrap();

        assert_eq!(drain(&output_rx), vec![1]);
        assert!(errors.lock().unwrap()[0].1.starts_with("Fatal error"));
    }

    #[test]
    fn test_station_runner_input_disconnect() {
        let (input_tx, input_rx) = unbounded::<Job<i32>>();
        let (output_tx, _output_rx) = unbounded();
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };
        let runner =
            StationRunner::spawn(station, input_rx, output_tx, Arc::new(MockReporter::default()));

        drop(input_tx);
        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));
    }
}
