//! A servo command travelling the whole driver path: wire bytes, servo
//! dispatcher, IK, manipulator execution on the simulated robot.

use approx::assert_relative_eq;
use stretchlink_driver::server::servo_dispatcher;
use stretchlink_driver::{ControllerSettings, Dispatch, RobotController};
use stretchlink_hal::{Actuator, HardwareCall, SimRobot};
use stretchlink_middleware::protocol::encode_with_timestamp;
use stretchlink_types::{Pose3D, ServoCommand, ValidationMode, Vector3D, Vector4D, WireMessage};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn servo_message(command: &ServoCommand) -> Result<Vec<Vec<u8>>, Box<dyn std::error::Error>> {
    let mut frames = vec![b"servo".to_vec()];
    frames.extend(encode_with_timestamp(command.to_bytes()?));
    Ok(frames)
}

#[test]
fn forward_nudge_extends_the_arm() -> TestResult {
    let robot = SimRobot::new()
        .with_position(Actuator::Lift, 0.5)
        .with_position(Actuator::Arm, 0.3);
    let handle = robot.handle();
    let controller =
        RobotController::start(Box::new(robot), ControllerSettings::default())?.into_shared();
    handle.clear();

    let command = ServoCommand::new(
        Pose3D::new(Vector3D::new(0.05, 0.0, 0.0), Vector4D::identity()),
        0.5,
    )?;
    let dispatcher = servo_dispatcher(&controller, ValidationMode::Strict);
    assert_eq!(dispatcher.handle(&servo_message(&command)?)?, Dispatch::Handled);

    let calls = handle.motion_calls();
    assert_eq!(
        calls.iter().filter(|c| **c == HardwareCall::PushCommand).count(),
        1,
        "exactly one command is pushed"
    );
    assert!(
        !calls
            .iter()
            .any(|c| matches!(c, HardwareCall::TranslateBy(_) | HardwareCall::RotateBy(_))),
        "servo never moves the base"
    );
    assert!(calls.contains(&HardwareCall::MoveTo(Actuator::Gripper, 50.0)));
    assert!(calls.contains(&HardwareCall::MoveTo(Actuator::HeadPan, 0.0)));
    assert!(calls.contains(&HardwareCall::MoveTo(Actuator::HeadTilt, 0.0)));

    let arm = calls
        .iter()
        .find_map(|c| match c {
            HardwareCall::MoveTo(Actuator::Arm, v) => Some(*v),
            _ => None,
        })
        .ok_or("arm was not commanded")?;
    assert_relative_eq!(arm, 0.35, epsilon = 1e-3);

    let lift = handle.status().lift.pos;
    assert_relative_eq!(lift, 0.5, epsilon = 1e-3);
    Ok(())
}

#[test]
fn unreachable_target_leaves_the_robot_still() -> TestResult {
    let robot = SimRobot::new().with_position(Actuator::Lift, 0.5);
    let handle = robot.handle();
    let controller =
        RobotController::start(Box::new(robot), ControllerSettings::default())?.into_shared();
    handle.clear();

    let command = ServoCommand::new(
        Pose3D::new(Vector3D::new(0.0, 0.0, 5.0), Vector4D::identity()),
        0.5,
    )?;
    let dispatcher = servo_dispatcher(&controller, ValidationMode::Strict);
    assert!(dispatcher.handle(&servo_message(&command)?).is_err());
    assert!(handle.motion_calls().is_empty());
    Ok(())
}

#[test]
fn out_of_range_gripper_is_rejected_on_decode() -> TestResult {
    let controller =
        RobotController::start(Box::new(SimRobot::new()), ControllerSettings::default())?
            .into_shared();
    let dispatcher = servo_dispatcher(&controller, ValidationMode::Strict);

    let payload = rmp_serde::to_vec_named(&serde_json::json!({
        "ee_pose": {
            "position": {"x": 0.0, "y": 0.0, "z": 0.0},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}
        },
        "gripper": 1.5
    }))?;
    let mut frames = vec![b"servo".to_vec()];
    frames.extend(encode_with_timestamp(payload));
    assert!(dispatcher.handle(&frames).is_err());
    Ok(())
}
