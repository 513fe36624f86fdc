#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::device::stdin::LineReader;
    use crate::device::{
        scan_queue, CodeAccumulator, DeviceReader, DeviceTransport, KeyInput, KeySource, ReaderState,
    };
    use crate::error::DeviceError;

    enum Step {
        Key(KeyInput),
        ReadError,
    }

    /// Plays back a fixed script of open results and key events, then blocks.
    struct ScriptedSource {
        open_results: VecDeque<bool>,
        steps: VecDeque<Step>,
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(open_results: Vec<bool>, steps: Vec<Step>) -> Self {
            Self {
                open_results: open_results.into(),
                steps: steps.into(),
                opens: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl KeySource for ScriptedSource {
        async fn open(&mut self) -> Result<(), DeviceError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.open_results.pop_front().unwrap_or(true) {
                Ok(())
            } else {
                Err(DeviceError::Open {
                    path: PathBuf::from("/dev/input/fake"),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "unplugged"),
                })
            }
        }

        async fn next_key(&mut self) -> Result<KeyInput, DeviceError> {
            match self.steps.pop_front() {
                Some(Step::Key(k)) => Ok(k),
                Some(Step::ReadError) => Err(DeviceError::Read(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device went away",
                ))),
                None => std::future::pending().await,
            }
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    /// Digits become digit keys, '\n' becomes ENTER, anything else an unrelated key.
    fn typed(text: &str) -> Vec<Step> {
        text.chars()
            .map(|c| match c {
                '0'..='9' => Step::Key(KeyInput::Digit(c as u8 - b'0')),
                '\n' => Step::Key(KeyInput::Enter),
                _ => Step::Key(KeyInput::Other),
            })
            .collect()
    }

    const FAST_RETRY: Duration = Duration::from_millis(5);

    #[test]
    fn accumulator_collects_digits_until_enter() {
        let mut acc = CodeAccumulator::new();
        assert_eq!(acc.push(KeyInput::Digit(9)), None);
        assert_eq!(acc.push(KeyInput::Digit(7)), None);
        assert_eq!(acc.push(KeyInput::Other), None);
        assert_eq!(acc.push(KeyInput::Digit(8)), None);
        assert_eq!(acc.pending(), "978");
        assert_eq!(acc.push(KeyInput::Enter), Some("978".to_string()));
        assert_eq!(acc.pending(), "");
        // ENTER on nothing still completes a (empty) code
        assert_eq!(acc.push(KeyInput::Enter), Some(String::new()));
        // not a single digit
        assert_eq!(acc.push(KeyInput::Digit(12)), None);
        assert_eq!(acc.flush(), "");
    }

    #[tokio::test]
    async fn reader_delivers_completed_codes_in_order() {
        let mut steps = typed("00000051\n");
        steps.extend(typed("9780141182550\n"));
        let source = ScriptedSource::new(vec![], steps);
        let (tx, mut rx) = scan_queue(8);
        let reader = DeviceReader::new(source, tx, FAST_RETRY);
        assert_eq!(reader.state(), ReaderState::Closed);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reader.run(cancel.clone()));

        assert_eq!(rx.next_code().await.as_deref(), Some("00000051"));
        assert_eq!(rx.next_code().await.as_deref(), Some("9780141182550"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn reader_keeps_retrying_until_the_device_opens() {
        let source = ScriptedSource::new(vec![false, false, false, true], typed("12345678\n"));
        let opens = source.opens.clone();
        let (tx, mut rx) = scan_queue(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(DeviceReader::new(source, tx, FAST_RETRY).run(cancel.clone()));

        let code = tokio::time::timeout(Duration::from_secs(5), rx.next_code()).await.unwrap();
        assert_eq!(code.as_deref(), Some("12345678"));
        assert_eq!(opens.load(Ordering::SeqCst), 4);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn read_error_flushes_partial_code_and_reopens() {
        let mut steps = typed("978");
        steps.push(Step::ReadError);
        steps.extend(typed("00000051\n"));
        let source = ScriptedSource::new(vec![], steps);
        let opens = source.opens.clone();
        let closes = source.closes.clone();
        let (tx, mut rx) = scan_queue(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(DeviceReader::new(source, tx, FAST_RETRY).run(cancel.clone()));

        assert_eq!(rx.next_code().await.as_deref(), Some("978"));
        assert_eq!(rx.next_code().await.as_deref(), Some("00000051"));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert!(closes.load(Ordering::SeqCst) >= 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn read_error_with_nothing_pending_yields_an_empty_code() {
        let mut steps = vec![Step::ReadError];
        steps.extend(typed("1\n"));
        let (tx, mut rx) = scan_queue(8);
        let cancel = CancellationToken::new();
        let handle =
            tokio::spawn(DeviceReader::new(ScriptedSource::new(vec![], steps), tx, FAST_RETRY).run(cancel.clone()));

        assert_eq!(rx.next_code().await.as_deref(), Some(""));
        assert_eq!(rx.next_code().await.as_deref(), Some("1"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn slow_consumer_loses_nothing() {
        let codes: Vec<String> = (0..50).map(|i| format!("97800000{:05}", i)).collect();
        let mut steps = Vec::new();
        for code in &codes {
            steps.extend(typed(code));
            steps.push(Step::Key(KeyInput::Enter));
        }
        // a queue much smaller than the burst
        let (tx, mut rx) = scan_queue(4);
        let cancel = CancellationToken::new();
        let handle =
            tokio::spawn(DeviceReader::new(ScriptedSource::new(vec![], steps), tx, FAST_RETRY).run(cancel.clone()));

        let mut received = Vec::new();
        while received.len() < codes.len() {
            tokio::time::sleep(Duration::from_millis(1)).await;
            received.push(rx.next_code().await.unwrap());
        }
        assert_eq!(received, codes);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_interrupts_the_retry_sleep() {
        // never opens, and waits a long time between attempts
        let source = ScriptedSource::new(vec![false; 16], vec![]);
        let opens = source.opens.clone();
        let (tx, mut rx) = scan_queue(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(DeviceReader::new(source, tx, Duration::from_secs(60)).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        // producer is gone, so the queue reports closed
        assert_eq!(rx.next_code().await, None);
    }

    #[tokio::test]
    async fn cancel_releases_a_producer_blocked_on_a_full_queue() {
        let source = ScriptedSource::new(vec![], typed("1\n2\n3\n"));
        let closes = source.closes.clone();
        let (tx, _rx) = scan_queue(1);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(DeviceReader::new(source, tx, FAST_RETRY).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(closes.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn line_reader_forwards_trimmed_lines_until_eof() {
        let input: &[u8] = b"00000051\n  9780141182550 \n\n";
        let (tx, mut rx) = scan_queue(8);
        LineReader::new(input, tx).run(CancellationToken::new()).await;

        assert_eq!(rx.next_code().await.as_deref(), Some("00000051"));
        assert_eq!(rx.next_code().await.as_deref(), Some("9780141182550"));
        assert_eq!(rx.next_code().await.as_deref(), Some(""));
        assert_eq!(rx.next_code().await, None);
    }

    #[tokio::test]
    async fn line_reader_survives_a_line_that_is_not_utf8() {
        let input: &[u8] = b"00000051\n\xff\xfe\n9780141182550\n";
        let (tx, mut rx) = scan_queue(8);
        LineReader::new(input, tx).run(CancellationToken::new()).await;

        assert_eq!(rx.next_code().await.as_deref(), Some("00000051"));
        // garbled, later discarded for its length
        assert_eq!(rx.next_code().await.map(|c| c.chars().count()), Some(2));
        assert_eq!(rx.next_code().await.as_deref(), Some("9780141182550"));
        assert_eq!(rx.next_code().await, None);
    }

    #[tokio::test]
    async fn line_reader_delivers_last_line_without_newline() {
        let input: &[u8] = b"00000051\r\n9780141182550";
        let (tx, mut rx) = scan_queue(8);
        LineReader::new(input, tx).run(CancellationToken::new()).await;

        assert_eq!(rx.next_code().await.as_deref(), Some("00000051"));
        assert_eq!(rx.next_code().await.as_deref(), Some("9780141182550"));
        assert_eq!(rx.next_code().await, None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn missing_input_device_fails_to_open() {
        use crate::device::evdev::HardwareKeySource;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event-missing");
        let mut source = HardwareKeySource::new(path.clone());
        match source.open().await {
            Err(DeviceError::Open { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected open error, got {other:?}"),
        }
        assert!(source.next_key().await.is_err());
    }

    #[test]
    fn transport_follows_configured_path() {
        assert_eq!(DeviceTransport::from_path(None), DeviceTransport::InteractiveStdin);
        assert_eq!(
            DeviceTransport::from_path(Some(PathBuf::from("/dev/input/event3"))),
            DeviceTransport::HardwareDevice { path: PathBuf::from("/dev/input/event3") }
        );
    }
}
