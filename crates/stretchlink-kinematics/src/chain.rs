//! Kinematic chain described as data.
//!
//! A description is a root frame plus an ordered list of joints.  Each joint
//! connects an already known parent frame to a new child frame, so the
//! frames form a tree rooted at `root`.
//!
//! ```toml
//! root = "base_link"
//!
//! [[joint]]
//! name = "joint_lift"
//! kind = "prismatic"
//! parent = "base_link"
//! child = "link_lift"
//! xyz = [0.0, 0.0, 0.2]
//! axis = [0.0, 0.0, 1.0]
//! lower = 0.0
//! upper = 1.1
//!
//! [[group]]
//! joint = "lift"
//! segments = ["joint_lift"]
//! ```

use std::collections::HashSet;
use std::f64::consts::FRAC_PI_2;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stretchlink_types::{JointName, LinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Revolute,
    Prismatic,
    Fixed,
}

fn default_axis() -> [f64; 3] {
    [1.0, 0.0, 0.0]
}

/// One joint: the transform from `parent` to `child` is
/// `origin(xyz, rpy) * motion(axis, q)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDescription {
    pub name: String,
    pub kind: JointKind,
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub xyz: [f64; 3],
    /// Fixed-axis roll, pitch, yaw in radians.
    #[serde(default)]
    pub rpy: [f64; 3],
    #[serde(default = "default_axis")]
    pub axis: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl JointDescription {
    fn new(name: &str, kind: JointKind, parent: &str, child: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent: parent.to_string(),
            child: child.to_string(),
            xyz: [0.0; 3],
            rpy: [0.0; 3],
            axis: default_axis(),
            lower: None,
            upper: None,
        }
    }

    fn at(mut self, xyz: [f64; 3]) -> Self {
        self.xyz = xyz;
        self
    }

    fn rotated(mut self, rpy: [f64; 3]) -> Self {
        self.rpy = rpy;
        self
    }

    fn axis(mut self, axis: [f64; 3]) -> Self {
        self.axis = axis;
        self
    }

    fn limits(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }
}

/// The model joints that together make up one wire joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentGroup {
    pub joint: JointName,
    pub segments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDescription {
    pub root: String,
    #[serde(rename = "joint", default)]
    pub joints: Vec<JointDescription>,
    #[serde(rename = "group", default)]
    pub groups: Vec<SegmentGroup>,
}

/// Names of the four telescoping arm segments, proximal first.
pub const ARM_SEGMENTS: [&str; 4] = ["joint_arm_l3", "joint_arm_l2", "joint_arm_l1", "joint_arm_l0"];

/// Travel of one arm segment in metres.
const ARM_SEGMENT_TRAVEL: f64 = 0.13;

impl ChainDescription {
    /// Parse a TOML description and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, LinkError> {
        let description: Self =
            toml::from_str(text).map_err(|e| LinkError::InvalidChain(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// Load and validate a TOML description from `path`.
    pub fn load(path: &Path) -> Result<Self, LinkError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LinkError::InvalidChain(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, LinkError> {
        toml::to_string(self).map_err(|e| LinkError::Serialization(e.to_string()))
    }

    /// Check that the joints form a tree rooted at `root` with sane limits,
    /// and that every group names existing actuated joints.
    pub fn validate(&self) -> Result<(), LinkError> {
        let mut frames = HashSet::from([self.root.as_str()]);
        let mut joint_names = HashSet::new();

        for joint in &self.joints {
            if !joint_names.insert(joint.name.as_str()) {
                return Err(LinkError::InvalidChain(format!(
                    "duplicate joint '{}'",
                    joint.name
                )));
            }
            if !frames.contains(joint.parent.as_str()) {
                return Err(LinkError::InvalidChain(format!(
                    "joint '{}' has unknown parent frame '{}'",
                    joint.name, joint.parent
                )));
            }
            if !frames.insert(joint.child.as_str()) {
                return Err(LinkError::InvalidChain(format!(
                    "frame '{}' is defined twice",
                    joint.child
                )));
            }
            if joint.kind != JointKind::Fixed {
                let norm = joint.axis.iter().map(|a| a * a).sum::<f64>().sqrt();
                if norm < 1e-9 {
                    return Err(LinkError::InvalidChain(format!(
                        "joint '{}' has a zero axis",
                        joint.name
                    )));
                }
            }
            if let (Some(lower), Some(upper)) = (joint.lower, joint.upper) {
                if lower > upper {
                    return Err(LinkError::InvalidChain(format!(
                        "joint '{}' has lower limit {lower} above upper limit {upper}",
                        joint.name
                    )));
                }
            }
        }

        for group in &self.groups {
            if group.segments.is_empty() {
                return Err(LinkError::InvalidChain(format!(
                    "group '{}' has no segments",
                    group.joint
                )));
            }
            for segment in &group.segments {
                let actuated = self
                    .joints
                    .iter()
                    .any(|j| &j.name == segment && j.kind != JointKind::Fixed);
                if !actuated {
                    return Err(LinkError::InvalidChain(format!(
                        "group '{}' names '{segment}', which is not an actuated joint",
                        group.joint
                    )));
                }
            }
        }
        Ok(())
    }

    /// Built-in description of the Stretch lift, telescoping arm and wrist.
    ///
    /// The arm extends along `-y` of `base_link`; the arm frames are turned
    /// so that their local `x` points along the extension, which is also
    /// the `x` axis of `link_grasp_center` when the wrist is centred.  The
    /// base is not part of the chain.
    pub fn stretch() -> Self {
        use JointKind::{Fixed, Prismatic, Revolute};

        let mut joints = vec![
            JointDescription::new("joint_lift", Prismatic, "base_link", "link_lift")
                .at([-0.11, 0.13, 0.2])
                .axis([0.0, 0.0, 1.0])
                .limits(0.0, 1.1),
        ];

        let mut parent = "link_lift".to_string();
        for (i, name) in ARM_SEGMENTS.iter().enumerate() {
            let child = format!("link_{}", name.trim_start_matches("joint_"));
            let mut joint = JointDescription::new(name, Prismatic, &parent, &child)
                .limits(0.0, ARM_SEGMENT_TRAVEL);
            if i == 0 {
                joint = joint.at([0.0, -0.2, 0.0]).rotated([0.0, 0.0, -FRAC_PI_2]);
            }
            joints.push(joint);
            parent = child;
        }

        joints.extend([
            JointDescription::new("joint_wrist_yaw", Revolute, &parent, "link_wrist_yaw")
                .at([0.1, 0.0, -0.03])
                .axis([0.0, 0.0, 1.0])
                .limits(-1.75, 4.0),
            JointDescription::new("joint_wrist_pitch", Revolute, "link_wrist_yaw", "link_wrist_pitch")
                .at([0.05, 0.0, -0.05])
                .axis([0.0, 1.0, 0.0])
                .limits(-1.57, 0.56),
            JointDescription::new("joint_wrist_roll", Revolute, "link_wrist_pitch", "link_wrist_roll")
                .at([0.02, 0.0, 0.0])
                .axis([1.0, 0.0, 0.0])
                .limits(-3.14, 3.14),
            JointDescription::new("joint_grasp_center", Fixed, "link_wrist_roll", "link_grasp_center")
                .at([0.1, 0.0, 0.0]),
        ]);

        let single = |joint: JointName, name: &str| SegmentGroup {
            joint,
            segments: vec![name.to_string()],
        };

        Self {
            root: "base_link".to_string(),
            joints,
            groups: vec![
                single(JointName::Lift, "joint_lift"),
                SegmentGroup {
                    joint: JointName::Arm,
                    segments: ARM_SEGMENTS.iter().map(|s| s.to_string()).collect(),
                },
                single(JointName::WristYaw, "joint_wrist_yaw"),
                single(JointName::WristPitch, "joint_wrist_pitch"),
                single(JointName::WristRoll, "joint_wrist_roll"),
            ],
        }
    }
}
