// Line-oriented sample source
//
// Parses the device's `"<angle>,<force>\n"` text protocol over any
// `io::Read`. Serial handles are expected to be opened with a read timeout
// matching the one handed to `next_sample`; a generic reader cannot impose
// one after the fact, so the timeout is enforced at acquire time, the way
// the firmware link is configured.

use std::io::{BufRead, BufReader, Read, Write};
use std::time::Duration;

use log::{debug, warn};

use crate::error::TransportError;
use crate::plan::Plan;
use crate::source::{SamplePoll, SampleSource, SensorReading};

/// Parse one protocol line into a reading.
///
/// Lines with fewer than two comma-separated fields, unparseable floats or
/// non-finite values are malformed and yield `None`; the caller treats that
/// as no-sample, not as an error.
pub fn parse_sample_line(line: &str) -> Option<SensorReading> {
    let mut parts = line.trim().split(',');
    let angle: f64 = parts.next()?.trim().parse().ok()?;
    let force: f64 = parts.next()?.trim().parse().ok()?;
    if !angle.is_finite() || !force.is_finite() {
        return None;
    }
    Some(SensorReading { angle, force })
}

/// Send the pre-session setup commands the firmware expects: the spring
/// setting on one line, then the exercise-type byte (`E`/`F`) on the next.
///
/// Setup failure leaves the session in degraded mode; callers log the
/// error and continue without live data.
pub fn send_device_setup<W: Write>(link: &mut W, plan: &Plan) -> Result<(), TransportError> {
    let write = |link: &mut W, bytes: &[u8]| -> Result<(), TransportError> {
        link.write_all(bytes).map_err(|err| TransportError::SetupFailed {
            reason: err.to_string(),
        })
    };
    write(link, format!("{}\n", plan.spring).as_bytes())?;
    write(link, &[plan.exercise.command_byte(), b'\n'])?;
    link.flush().map_err(|err| TransportError::SetupFailed {
        reason: err.to_string(),
    })?;
    debug!(
        "[Source] Device setup sent: spring {}, type {}",
        plan.spring,
        plan.exercise.command_byte() as char
    );
    Ok(())
}

/// Sample source over a line-oriented byte stream.
///
/// End of stream and I/O errors both surface as `Disconnected`; malformed
/// lines are discarded silently. A serial handle carries a write half too;
/// built with [LineSampleSource::with_link] the source sends the device
/// setup commands during `prepare`. Read-only streams (capture replay)
/// skip the handshake.
pub struct LineSampleSource<R: Read + Send, W: Write + Send = std::io::Sink> {
    reader: Option<BufReader<R>>,
    link: Option<W>,
}

impl<R: Read + Send> LineSampleSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: Some(BufReader::new(inner)),
            link: None,
        }
    }
}

impl<R: Read + Send, W: Write + Send> LineSampleSource<R, W> {
    /// Build over a duplex link: `inner` streams samples in, `link` carries
    /// the setup commands out.
    pub fn with_link(inner: R, link: W) -> Self {
        Self {
            reader: Some(BufReader::new(inner)),
            link: Some(link),
        }
    }
}

impl<R: Read + Send, W: Write + Send> SampleSource for LineSampleSource<R, W> {
    fn prepare(&mut self, plan: &Plan) -> Result<(), TransportError> {
        match self.link.as_mut() {
            Some(link) => send_device_setup(link, plan),
            None => Ok(()),
        }
    }

    fn next_sample(&mut self, _timeout: Duration) -> SamplePoll {
        let Some(reader) = self.reader.as_mut() else {
            return SamplePoll::Disconnected;
        };

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => SamplePoll::Disconnected,
            Ok(_) => match parse_sample_line(&line) {
                Some(reading) => SamplePoll::Sample(reading),
                None => SamplePoll::Timeout,
            },
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut
                || err.kind() == std::io::ErrorKind::WouldBlock =>
            {
                SamplePoll::Timeout
            }
            Err(err) => {
                warn!("[Source] Read failed, degrading: {}", err);
                SamplePoll::Disconnected
            }
        }
    }

    fn release(&mut self) -> Result<(), TransportError> {
        // Dropping both halves closes the handle
        self.reader = None;
        self.link = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ExerciseType, Leg, Plan, PlanMode};

    fn plan() -> Plan {
        Plan {
            id: 1,
            mode: PlanMode::Active,
            leg: Leg::Left,
            exercise: ExerciseType::Flexion,
            spring: 3,
            angle_min: 0.0,
            angle_max: 90.0,
            target_repetitions: 5,
        }
    }

    #[test]
    fn test_parse_valid_line() {
        let reading = parse_sample_line("45.5,12.25\n").unwrap();
        assert_eq!(reading.angle, 45.5);
        assert_eq!(reading.force, 12.25);
    }

    #[test]
    fn test_parse_tolerates_trailing_fields_and_spaces() {
        let reading = parse_sample_line(" 10.0 , 2.0 , extra\r\n").unwrap();
        assert_eq!(reading.angle, 10.0);
        assert_eq!(reading.force, 2.0);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse_sample_line("").is_none());
        assert!(parse_sample_line("45.5").is_none());
        assert!(parse_sample_line("abc,def").is_none());
        assert!(parse_sample_line("NaN,1.0").is_none());
        assert!(parse_sample_line("inf,1.0").is_none());
    }

    #[test]
    fn test_line_source_streams_and_disconnects_at_eof() {
        let data = b"10.0,1.0\ngarbage\n20.0,2.0\n".to_vec();
        let mut source = LineSampleSource::new(std::io::Cursor::new(data));
        let timeout = Duration::from_millis(10);

        assert_eq!(
            source.next_sample(timeout),
            SamplePoll::Sample(SensorReading {
                angle: 10.0,
                force: 1.0
            })
        );
        // Malformed line is a silent no-sample
        assert_eq!(source.next_sample(timeout), SamplePoll::Timeout);
        assert_eq!(
            source.next_sample(timeout),
            SamplePoll::Sample(SensorReading {
                angle: 20.0,
                force: 2.0
            })
        );
        assert_eq!(source.next_sample(timeout), SamplePoll::Disconnected);
        // Stays disconnected on further polls
        assert_eq!(source.next_sample(timeout), SamplePoll::Disconnected);
    }

    #[test]
    fn test_release_drops_the_handle() {
        let mut source = LineSampleSource::new(std::io::Cursor::new(b"10.0,1.0\n".to_vec()));
        source.release().unwrap();
        assert_eq!(
            source.next_sample(Duration::from_millis(10)),
            SamplePoll::Disconnected
        );
    }

    #[test]
    fn test_device_setup_wire_format() {
        let mut link = Vec::new();
        send_device_setup(&mut link, &plan()).unwrap();
        assert_eq!(link, b"3\nF\n");
    }

    #[test]
    fn test_prepare_sends_setup_over_the_link() {
        let mut link = Vec::new();
        let mut source =
            LineSampleSource::with_link(std::io::Cursor::new(b"10.0,1.0\n".to_vec()), &mut link);
        source.prepare(&plan()).unwrap();
        assert!(matches!(
            source.next_sample(Duration::from_millis(10)),
            SamplePoll::Sample(_)
        ));
        drop(source);
        assert_eq!(link, b"3\nF\n");
    }

    #[test]
    fn test_prepare_without_link_is_a_noop() {
        let mut source = LineSampleSource::new(std::io::Cursor::new(b"10.0,1.0\n".to_vec()));
        source.prepare(&plan()).unwrap();
    }
}
