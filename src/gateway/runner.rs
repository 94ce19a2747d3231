//! Serialized execution of token sequences against the shared command tree.
//!
//! One invocation at a time holds the [`Session`]: the registry and the
//! console sink it prints through. Under that lock the runner
//!
//! 1. resets flags and sets the new arguments,
//! 2. optionally echoes the command line to the console,
//! 3. creates a capture buffer and redirects the console into it,
//! 4. executes,
//! 5. drops the redirect (closing the capture writer, restoring the console),
//! 6. reads the captured bytes back.
//!
//! Command failures are already rendered into the captured output by the
//! registry and do not fail the invocation. The echo is best-effort. Only
//! capture problems and panics surface as [`InfrastructureError`].

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::capture::{CaptureBuffer, OutputSink};
use super::registry::{CommandRegistry, NodeInfo};
use super::translate::TokenSequence;
use crate::config::CaptureSection;
use crate::errors::InfrastructureError;

/// Shared command state: the command tree plus the console it prints to.
pub struct Session {
    registry: Box<dyn CommandRegistry>,
    console: OutputSink,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("console", &self.console)
            .finish_non_exhaustive()
    }
}

/// Runs invocations one at a time. Clones share the same session.
#[derive(Debug, Clone)]
pub struct InvocationRunner {
    session: Arc<Mutex<Session>>,
    capture: CaptureSection,
}

impl InvocationRunner {
    pub fn new(
        registry: impl CommandRegistry + 'static,
        console: OutputSink,
        capture: CaptureSection,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session {
                registry: Box::new(registry),
                console,
            })),
            capture,
        }
    }

    /// Acquire the session, recovering from a panic in a previous action.
    ///
    /// Flags are reset and the console restored on every invocation, so a
    /// poisoned session carries no state worth discarding.
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| {
            warn!("Previous invocation panicked; recovering command session");
            self.session.clear_poison();
            poisoned.into_inner()
        })
    }

    /// Execute `tokens` and return everything the command printed.
    pub fn run(&self, tokens: &TokenSequence) -> Result<Vec<u8>, InfrastructureError> {
        let mut session = self.lock();
        let Session { registry, console } = &mut *session;

        registry.reset_flags();
        registry.set_args(tokens.as_slice().to_vec());

        if self.capture.echo_commands
            && let Err(err) = writeln!(console, "received command line: {:?}", tokens.as_slice())
                .and_then(|()| console.flush())
        {
            warn!(error = %err, "Failed to echo command line to console");
        }

        let buffer =
            CaptureBuffer::with_limit(self.capture.max_output_bytes, self.capture.initial_capacity)?;

        let outcome = {
            let mut redirected = console.redirect(buffer.writer());
            registry.execute(&mut redirected)
        };

        if let Err(err) = &outcome {
            debug!(error = %err, "Command reported failure");
        }

        let output = buffer.finish()?;
        info!(
            tokens = tokens.len(),
            bytes = output.len(),
            success = outcome.is_ok(),
            "Invocation finished"
        );
        Ok(output)
    }

    /// [`run`](Self::run) on a blocking thread.
    pub async fn call(&self, tokens: TokenSequence) -> Result<Vec<u8>, InfrastructureError> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || runner.run(&tokens))
            .await
            .map_err(join_error)?
    }

    /// Describe the node at `path`, waiting for any running invocation.
    pub async fn resolve(&self, path: Vec<String>) -> Result<Option<NodeInfo>, InfrastructureError> {
        let runner = self.clone();
        tokio::task::spawn_blocking(move || {
            let session = runner.lock();
            session.registry.lookup(&path)
        })
        .await
        .map_err(join_error)
    }

    /// Write directly to the console, outside of any invocation.
    pub fn write_console(&self, bytes: &[u8]) -> Result<(), InfrastructureError> {
        let mut session = self.lock();
        session
            .console
            .write_all(bytes)
            .and_then(|()| session.console.flush())
            .map_err(InfrastructureError::Console)
    }
}

fn join_error(err: tokio::task::JoinError) -> InfrastructureError {
    if err.is_panic() {
        InfrastructureError::ActionPanicked
    } else {
        InfrastructureError::Join(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::errors::CaptureError;
    use crate::gateway::capture::tests::SharedBuf;
    use crate::gateway::registry::ClapRegistry;
    use clap::{Arg, Command};

    fn tokens(items: &[&str]) -> TokenSequence {
        TokenSequence::new(items.iter().map(|t| t.to_string()).collect())
    }

    fn quiet() -> CaptureSection {
        CaptureSection {
            echo_commands: false,
            ..CaptureSection::default()
        }
    }

    fn demo_runner(capture: CaptureSection) -> (InvocationRunner, SharedBuf) {
        let console = SharedBuf::default();
        let runner = InvocationRunner::new(
            demo::registry(),
            OutputSink::new(console.clone()),
            capture,
        );
        (runner, console)
    }

    fn stress_registry() -> ClapRegistry {
        let command = Command::new("stress")
            .subcommand(Command::new("spell").arg(Arg::new("tag").long("tag").required(true)))
            .subcommand(Command::new("flood"))
            .subcommand(Command::new("ok"))
            .subcommand(Command::new("boom"));

        ClapRegistry::new(command)
            .action(&["spell"], |m, out| {
                let tag = m.get_one::<String>("tag").cloned().unwrap_or_default();
                for _ in 0..50 {
                    out.write_all(tag.as_bytes())?;
                    std::thread::yield_now();
                }
                Ok(())
            })
            .action(&["flood"], |_, out| {
                out.write_all(&[b'x'; 64])?;
                Ok(())
            })
            .action(&["ok"], |_, out| {
                writeln!(out, "ok")?;
                Ok(())
            })
            .action(&["boom"], |_, out| {
                writeln!(out, "partial")?;
                panic!("action panicked");
            })
    }

    #[test]
    fn test_run_captures_command_output() {
        let (runner, console) = demo_runner(CaptureSection::default());
        let output = runner
            .run(&tokens(&["fct1", "sf11", "--p2", "255", "--p3", "Hi there!", "--p1"]))
            .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Executing sub function 2\nP1: true\nP2: 255\nP3: Hi there!\n"
        );
        assert_eq!(
            console.contents(),
            "received command line: [\"fct1\", \"sf11\", \"--p2\", \"255\", \"--p3\", \"Hi there!\", \"--p1\"]\n"
        );
    }

    #[test]
    fn test_repeated_runs_are_identical_and_flags_reset() {
        let (runner, _) = demo_runner(quiet());
        let request = tokens(&["fct1", "sf11", "--p2", "7"]);
        let first = runner.run(&request).unwrap();
        let second = runner.run(&request).unwrap();
        assert_eq!(first, second);

        let defaults = runner.run(&tokens(&["fct1", "sf11"])).unwrap();
        assert_eq!(
            String::from_utf8(defaults).unwrap(),
            "Executing sub function 2\nP1: false\nP2: 0\nP3: \n"
        );
    }

    #[test]
    fn test_command_failure_is_captured_and_console_restored() {
        let (runner, console) = demo_runner(quiet());
        let output = runner.run(&tokens(&["fct3"])).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("fct3"), "output: {}", text);

        runner.write_console(b"unrelated write\n").unwrap();
        assert_eq!(console.contents(), "unrelated write\n");
    }

    #[derive(Debug)]
    struct ClosedConsole;

    impl Write for ClosedConsole {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    #[test]
    fn test_closed_console_does_not_fail_invocation() {
        let runner = InvocationRunner::new(
            demo::registry(),
            OutputSink::new(ClosedConsole),
            CaptureSection::default(),
        );
        let output = runner.run(&tokens(&["fct1", "sf11", "--p2", "1"])).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Executing sub function 2\nP1: false\nP2: 1\nP3: \n"
        );

        let err = runner.write_console(b"direct\n").unwrap_err();
        assert!(matches!(err, InfrastructureError::Console(_)));
    }

    #[test]
    fn test_output_limit_is_infrastructure_error() {
        let capture = CaptureSection {
            max_output_bytes: 16,
            initial_capacity: 16,
            echo_commands: false,
        };
        let console = SharedBuf::default();
        let runner = InvocationRunner::new(stress_registry(), OutputSink::new(console.clone()), capture);

        let err = runner.run(&tokens(&["flood"])).unwrap_err();
        assert!(matches!(
            err,
            InfrastructureError::Capture(CaptureError::LimitExceeded { limit: 16 })
        ));

        runner.write_console(b"restored\n").unwrap();
        assert_eq!(console.contents(), "restored\n");

        let output = runner.run(&tokens(&["ok"])).unwrap();
        assert_eq!(output, b"ok\n");
    }

    #[test]
    fn test_capture_allocation_failure_aborts() {
        let capture = CaptureSection {
            max_output_bytes: usize::MAX,
            initial_capacity: usize::MAX,
            echo_commands: false,
        };
        let (runner, console) = demo_runner(capture);
        let err = runner.run(&tokens(&["fct1"])).unwrap_err();
        assert!(matches!(
            err,
            InfrastructureError::Capture(CaptureError::Allocate { .. })
        ));
        assert!(console.contents().is_empty());
    }

    #[test]
    fn test_concurrent_runs_never_interleave() {
        let runner = InvocationRunner::new(stress_registry(), OutputSink::new(SharedBuf::default()), quiet());

        std::thread::scope(|scope| {
            let handles: Vec<_> = ["a", "b", "c", "d", "e", "f"]
                .into_iter()
                .map(|tag| {
                    let runner = runner.clone();
                    scope.spawn(move || {
                        let output = runner.run(&tokens(&["spell", "--tag", tag])).unwrap();
                        (tag.to_string(), String::from_utf8(output).unwrap())
                    })
                })
                .collect();

            for handle in handles {
                let (tag, output) = handle.join().unwrap();
                assert_eq!(output, tag.repeat(50));
            }
        });
    }

    #[tokio::test]
    async fn test_panicking_action_restores_console_and_session() {
        let console = SharedBuf::default();
        let runner = InvocationRunner::new(stress_registry(), OutputSink::new(console.clone()), quiet());

        let err = runner.call(tokens(&["boom"])).await.unwrap_err();
        assert!(matches!(err, InfrastructureError::ActionPanicked));

        let output = runner.call(tokens(&["spell", "--tag", "z"])).await.unwrap();
        assert_eq!(output, "z".repeat(50).into_bytes());

        runner.write_console(b"console ok\n").unwrap();
        assert_eq!(console.contents(), "console ok\n");
    }

    #[tokio::test]
    async fn test_resolve_looks_up_nodes() {
        let (runner, _) = demo_runner(quiet());
        let node = runner
            .resolve(vec!["fct1".to_string(), "sf11".to_string()])
            .await
            .unwrap()
            .unwrap();
        assert!(node.runnable);
        assert!(node.flag("p2").unwrap().takes_value);

        assert!(runner.resolve(vec!["nope".to_string()]).await.unwrap().is_none());
    }
}
