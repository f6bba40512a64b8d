use serde::{Deserialize, Serialize};

/// Planar velocity command: forward, lateral and yaw rate
///
/// Serialized in twist shape so consumers of the output channel see
/// `{"linear":{"x","y","z"},"angular":{"x","y","z"}}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Twist", into = "Twist")]
pub struct VelocityCommand {
    pub linear_x: f64,
    pub linear_y: f64,
    pub angular_z: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Vector3 {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Twist {
    linear: Vector3,
    angular: Vector3,
}

impl From<Twist> for VelocityCommand {
    fn from(twist: Twist) -> Self {
        Self {
            linear_x: twist.linear.x,
            linear_y: twist.linear.y,
            angular_z: twist.angular.z,
        }
    }
}

impl From<VelocityCommand> for Twist {
    fn from(command: VelocityCommand) -> Self {
        Self {
            linear: Vector3 {
                x: command.linear_x,
                y: command.linear_y,
                z: 0.0,
            },
            angular: Vector3 {
                x: 0.0,
                y: 0.0,
                z: command.angular_z,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_twist() {
        let command = VelocityCommand {
            linear_x: 0.5,
            linear_y: -0.25,
            angular_z: 1.0,
        };
        let json: serde_json::Value = serde_json::to_value(command).unwrap();
        assert_eq!(json["linear"]["x"], 0.5);
        assert_eq!(json["linear"]["y"], -0.25);
        assert_eq!(json["linear"]["z"], 0.0);
        assert_eq!(json["angular"]["z"], 1.0);
    }
}
