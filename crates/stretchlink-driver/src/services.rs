//! Long-running driver services other than command dispatch.
//!
//! | Service | Runs on | Output |
//! |---|---|---|
//! | status | async task, sampling on the blocking pool | `[ts, Status]` at a fixed rate |
//! | goto | request/reply endpoint | `"ok"` or `"error: <message>"` |
//! | camera | blocking thread per camera | `[ts, color]`, or `rgb` / `depth` topics |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use stretchlink_hal::Camera;
use stretchlink_middleware::MessageBus;
use stretchlink_middleware::protocol::encode_with_timestamp;
use stretchlink_types::{LinkError, Twist2D, ValidationMode, WireMessage};
use tracing::{debug, error, info, warn};

use crate::controller::{self, SharedController};

// ────────────────────────────────────────────────────────────────────────────
// Status
// ────────────────────────────────────────────────────────────────────────────

/// Sampling period for `rate_hz`.
///
/// # Errors
///
/// [`LinkError::Validation`] unless `rate_hz` is finite and positive.
pub fn status_period(rate_hz: f64) -> Result<Duration, LinkError> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return Err(LinkError::Validation(format!(
            "status rate must be positive, got {rate_hz}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .map_err(|e| LinkError::Validation(format!("status rate {rate_hz}: {e}")))
}

/// Sample the robot once and publish the status.  Returns the number of
/// subscribers reached.
pub async fn publish_status(controller: &SharedController, bus: &MessageBus) -> Result<usize, LinkError> {
    let controller = Arc::clone(controller);
    let status = tokio::task::spawn_blocking(move || controller.lock().get_status())
        .await
        .map_err(|e| LinkError::Hardware {
            component: "status".to_string(),
            details: e.to_string(),
        })??;
    Ok(bus.publish(encode_with_timestamp(status.to_bytes()?)))
}

/// Publish status every `period` until the process exits.
///
/// An iteration that overruns the period is followed immediately by the
/// next one.  Failures are logged and sampling continues.
pub async fn run_status_publisher(controller: SharedController, bus: MessageBus, period: Duration) {
    info!(period_ms = period.as_secs_f64() * 1e3, "status publisher started");
    loop {
        let started = Instant::now();
        if let Err(e) = publish_status(&controller, &bus).await {
            error!(error = %e, "status sample failed");
        }
        match period.checked_sub(started.elapsed()) {
            Some(remaining) => tokio::time::sleep(remaining).await,
            None => {
                debug!("status sample overran its period");
                tokio::task::yield_now().await;
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Goto
// ────────────────────────────────────────────────────────────────────────────

/// Answer one `goto` request.
///
/// The wait runs on the blocking pool.  The controller is only locked for
/// short polls, so status and command services keep running meanwhile.
pub async fn handle_goto_request(
    controller: SharedController,
    mode: ValidationMode,
    request: Vec<u8>,
) -> String {
    let twist = match Twist2D::from_bytes(&request, mode) {
        Ok(twist) => twist,
        Err(e) => {
            error!(error = %e, "bad goto request");
            return format!("error: {e}");
        }
    };
    info!(linear = twist.linear, angular = twist.angular, "goto");

    let result = tokio::task::spawn_blocking(move || controller::goto(&controller, twist)).await;
    match result {
        Ok(Ok(())) => {
            info!("goto completed");
            "ok".to_string()
        }
        Ok(Err(e)) => {
            error!(error = %e, "goto failed");
            format!("error: {e}")
        }
        Err(e) => {
            error!(error = %e, "goto task panicked");
            format!("error: {e}")
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cameras
// ────────────────────────────────────────────────────────────────────────────

const CAMERA_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Publish frames from `camera` onto `bus` until `shutdown` is set.
///
/// Depth-capable cameras publish on topics `rgb` and `depth`; color-only
/// cameras publish untopiced `[ts, color]`.  A failed read is logged and
/// the loop carries on.  Blocking: run it on a dedicated thread.
pub fn run_camera(mut camera: Box<dyn Camera>, bus: MessageBus, shutdown: Arc<AtomicBool>) {
    info!(camera = camera.name(), depth = camera.has_depth(), "camera service started");
    while !shutdown.load(Ordering::SeqCst) {
        let frame = match camera.read() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(camera = camera.name(), error = %e, "camera read failed");
                std::thread::sleep(CAMERA_RETRY_DELAY);
                continue;
            }
        };
        match frame.depth {
            Some(depth) if camera.has_depth() => {
                bus.publish_topic("rgb", encode_with_timestamp(frame.color));
                bus.publish_topic("depth", encode_with_timestamp(depth));
            }
            _ => {
                bus.publish(encode_with_timestamp(frame.color));
            }
        }
    }
    info!(camera = camera.name(), "camera service stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerSettings, RobotController};
    use stretchlink_hal::{Actuator, HardwareCall, SimCamera, SimHandle, SimRobot};
    use stretchlink_middleware::decode_with_timestamp;
    use stretchlink_types::{JointName, Status};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn shared(robot: SimRobot) -> Result<(SharedController, SimHandle), LinkError> {
        let handle = robot.handle();
        let controller = RobotController::start(Box::new(robot), ControllerSettings::default())?;
        handle.clear();
        Ok((controller.into_shared(), handle))
    }

    #[test]
    fn status_period_rejects_non_positive_rates() -> TestResult {
        assert!((status_period(50.0)?.as_secs_f64() - 0.02).abs() < 1e-9);
        assert!(status_period(0.0).is_err());
        assert!(status_period(-5.0).is_err());
        assert!(status_period(f64::NAN).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn status_publisher_streams_decodable_status() -> TestResult {
        let (controller, _handle) = shared(SimRobot::new().with_position(Actuator::Lift, 0.4))?;
        let bus = MessageBus::new(16);
        let mut subscription = bus.subscribe_all();
        let task = tokio::spawn(run_status_publisher(
            controller,
            bus.clone(),
            Duration::from_millis(5),
        ));

        for _ in 0..2 {
            let frames = subscription.recv().await.ok_or("bus closed")?;
            let message = decode_with_timestamp(&frames)?;
            assert!(message.timestamp_ns > 0);
            let status = Status::from_bytes(&message.payload, ValidationMode::Strict)?;
            assert_eq!(status.position(JointName::Lift), Some(0.4));
        }
        task.abort();
        Ok(())
    }

    #[tokio::test]
    async fn goto_replies_ok_after_waiting() -> TestResult {
        let (controller, handle) = shared(SimRobot::new())?;
        let request = Twist2D::new(0.5, 0.0).to_bytes()?;
        let reply = handle_goto_request(controller, ValidationMode::Strict, request).await;
        assert_eq!(reply, "ok");
        assert_eq!(
            handle.motion_calls(),
            vec![HardwareCall::TranslateBy(0.5), HardwareCall::PushCommand]
        );
        Ok(())
    }

    #[tokio::test]
    async fn status_keeps_flowing_during_a_goto() -> TestResult {
        let motion = Duration::from_millis(800);
        let (controller, handle) = shared(SimRobot::new().with_motion_time(motion))?;
        let bus = MessageBus::new(16);
        let mut subscription = bus.subscribe_all();

        let request = Twist2D::new(0.3, 0.0).to_bytes()?;
        let started = Instant::now();
        let goto = tokio::spawn(handle_goto_request(
            Arc::clone(&controller),
            ValidationMode::Strict,
            request,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.set_position(Actuator::Arm, 0.2);
        let sampled = Instant::now();
        assert_eq!(publish_status(&controller, &bus).await?, 1);
        assert!(
            sampled.elapsed() < Duration::from_millis(200),
            "status sample waited {:?} behind goto",
            sampled.elapsed()
        );
        let frames = subscription.recv().await.ok_or("bus closed")?;
        let status = Status::from_bytes(&decode_with_timestamp(&frames)?.payload, ValidationMode::Strict)?;
        assert_eq!(status.position(JointName::Arm), Some(0.2));

        assert_eq!(goto.await?, "ok");
        assert!(started.elapsed() >= motion);
        Ok(())
    }

    #[tokio::test]
    async fn goto_replies_with_the_error() -> TestResult {
        let (controller, handle) = shared(SimRobot::new())?;
        let request = Twist2D::new(0.5, 0.5).to_bytes()?;
        let reply = handle_goto_request(Arc::clone(&controller), ValidationMode::Strict, request).await;
        assert!(reply.starts_with("error: "), "{reply}");
        assert!(handle.calls().is_empty());

        let reply = handle_goto_request(controller, ValidationMode::Strict, vec![0xc1]).await;
        assert!(reply.starts_with("error: "), "{reply}");
        Ok(())
    }

    fn collect_camera(camera: SimCamera, messages: usize) -> Result<Vec<Vec<Vec<u8>>>, Box<dyn std::error::Error>> {
        let bus = MessageBus::new(64);
        let mut subscription = bus.subscribe_all();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let worker = std::thread::spawn(move || run_camera(Box::new(camera), bus, flag));

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let collected = runtime.block_on(async {
            let mut out = Vec::new();
            while out.len() < messages {
                match subscription.recv().await {
                    Some(frames) => out.push(frames),
                    None => break,
                }
            }
            out
        });
        shutdown.store(true, Ordering::SeqCst);
        worker.join().map_err(|_| "camera thread panicked")?;
        Ok(collected)
    }

    #[test]
    fn depth_camera_publishes_rgb_and_depth_topics() -> TestResult {
        let messages = collect_camera(SimCamera::new("d405", 4, 2, 200, true), 2)?;
        assert_eq!(messages[0][0], b"rgb".to_vec());
        assert_eq!(messages[0][2].len(), 4 * 2 * 3);
        assert_eq!(messages[1][0], b"depth".to_vec());
        assert_eq!(messages[1][2].len(), 4 * 2 * 2);
        Ok(())
    }

    #[test]
    fn color_camera_publishes_without_topic() -> TestResult {
        let messages = collect_camera(SimCamera::new("arducam", 4, 2, 200, false), 1)?;
        let message = decode_with_timestamp(&messages[0])?;
        assert_eq!(message.payload.len(), 4 * 2 * 3);
        Ok(())
    }
}
