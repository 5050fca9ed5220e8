//! Physical actuators ↔ model joints.
//!
//! A physical actuator may be represented by several model joints of equal
//! share: the telescoping arm is four prismatic segments.  Writing divides
//! the physical value equally across the segments; reading sums them back.

use nalgebra::DVector;
use stretchlink_types::{JointName, LinkError};

use crate::chain::ChainDescription;
use crate::model::KinematicModel;

#[derive(Debug, Clone, PartialEq)]
pub struct JointMapping {
    groups: Vec<(JointName, Vec<String>)>,
}

impl JointMapping {
    pub fn from_description(description: &ChainDescription) -> Self {
        Self {
            groups: description
                .groups
                .iter()
                .map(|g| (g.joint, g.segments.clone()))
                .collect(),
        }
    }

    /// Wire joints that take part in the chain, in group order.
    pub fn joints(&self) -> impl Iterator<Item = JointName> + '_ {
        self.groups.iter().map(|(joint, _)| *joint)
    }

    pub fn contains(&self, joint: JointName) -> bool {
        self.groups.iter().any(|(j, _)| *j == joint)
    }

    /// Write physical values into the model's configuration.  Joints not in
    /// the mapping are ignored.  Does not refresh placements.
    pub fn write(
        &self,
        model: &mut KinematicModel,
        physical: &[(JointName, f64)],
    ) -> Result<(), LinkError> {
        for (joint, value) in physical {
            let Some(segments) = self.segments(*joint) else {
                continue;
            };
            let share = value / segments.len() as f64;
            for segment in segments {
                model.set_joint(segment, share)?;
            }
        }
        Ok(())
    }

    /// Physical value of `joint` in configuration `q`: the sum of its
    /// segments.
    pub fn read(
        &self,
        model: &KinematicModel,
        q: &DVector<f64>,
        joint: JointName,
    ) -> Result<f64, LinkError> {
        let segments = self
            .segments(joint)
            .ok_or_else(|| LinkError::JointNotFound(joint.to_string()))?;
        segments
            .iter()
            .map(|s| model.q_index(s).map(|i| q[i]))
            .sum()
    }

    fn segments(&self, joint: JointName) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(j, _)| *j == joint)
            .map(|(_, segments)| segments.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ARM_SEGMENTS;
    use approx::assert_relative_eq;

    fn setup() -> (KinematicModel, JointMapping) {
        let description = ChainDescription::stretch();
        (
            KinematicModel::new(&description).unwrap(),
            JointMapping::from_description(&description),
        )
    }

    #[test]
    fn arm_extension_is_split_equally() {
        let (mut model, mapping) = setup();
        mapping
            .write(&mut model, &[(JointName::Arm, 0.3), (JointName::Lift, 0.5)])
            .unwrap();
        for segment in ARM_SEGMENTS {
            assert_relative_eq!(model.joint_value(segment).unwrap(), 0.075);
        }
        assert_relative_eq!(model.joint_value("joint_lift").unwrap(), 0.5);
    }

    #[test]
    fn reading_sums_the_segments() {
        let (mut model, mapping) = setup();
        model.set_joint("joint_arm_l3", 0.1).unwrap();
        model.set_joint("joint_arm_l0", 0.02).unwrap();
        let arm = mapping.read(&model, model.q(), JointName::Arm).unwrap();
        assert_relative_eq!(arm, 0.12);
    }

    #[test]
    fn joints_outside_the_chain() {
        let (mut model, mapping) = setup();
        assert!(!mapping.contains(JointName::HeadPan));
        assert!(mapping.contains(JointName::WristRoll));
        mapping.write(&mut model, &[(JointName::Gripper, 50.0)]).unwrap();
        assert!(matches!(
            mapping.read(&model, model.q(), JointName::Gripper),
            Err(LinkError::JointNotFound(_))
        ));
        assert_eq!(
            mapping.joints().collect::<Vec<_>>(),
            vec![
                JointName::Lift,
                JointName::Arm,
                JointName::WristYaw,
                JointName::WristPitch,
                JointName::WristRoll
            ]
        );
    }
}
