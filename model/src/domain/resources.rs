use helper::uom_helper::cpu_ratio::cpu;
use helper::uom_helper::{cpu as cpu_helper, information};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use uom::si::f64::{Information, Ratio};
use uom::si::information::byte;

/// Amounts of the four resources tracked per node and per pod.
///
/// GPUs are counted as a float since a pod may hold a fraction of a device.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    #[serde_as(as = "cpu_helper::Helper")]
    pub cpus:       Ratio,
    #[serde_as(as = "information::Helper")]
    pub memory:     Information,
    pub gpus:       f64,
    #[serde_as(as = "information::Helper")]
    pub gpu_memory: Information,
}

impl ResourceQuantity {
    pub fn zero() -> Self {
        Self {
            cpus:       Ratio::new::<cpu>(0.0),
            memory:     Information::new::<byte>(0.0),
            gpus:       0.0,
            gpu_memory: Information::new::<byte>(0.0),
        }
    }
}

impl Default for ResourceQuantity {
    fn default() -> Self { Self::zero() }
}

impl Add for ResourceQuantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cpus:       self.cpus + rhs.cpus,
            memory:     self.memory + rhs.memory,
            gpus:       self.gpus + rhs.gpus,
            gpu_memory: self.gpu_memory + rhs.gpu_memory,
        }
    }
}

impl AddAssign for ResourceQuantity {
    fn add_assign(&mut self, rhs: Self) { *self = *self + rhs; }
}

impl Sum for ResourceQuantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

/// What a single pod adds to the node it is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PodResourceContribution {
    pub requested:    ResourceQuantity,
    pub limited:      ResourceQuantity,
    /// Equal to `requested` while the pod runs, zero otherwise.
    pub allocated:    ResourceQuantity,
    pub gpu_fraction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use helper::uom_helper::cpu_ratio::millicpu;
    use uom::si::information::gibibyte;

    #[test]
    fn test_sum() {
        let a = ResourceQuantity {
            cpus: Ratio::new::<millicpu>(500.0),
            memory: Information::new::<gibibyte>(1.0),
            gpus: 0.5,
            ..ResourceQuantity::zero()
        };
        let b = ResourceQuantity {
            cpus: Ratio::new::<cpu>(1.0),
            gpus: 0.25,
            ..ResourceQuantity::zero()
        };

        let total: ResourceQuantity = vec![a, b].into_iter().sum();
        assert_eq!(total.cpus, Ratio::new::<millicpu>(1500.0));
        assert_eq!(total.memory, Information::new::<gibibyte>(1.0));
        assert_eq!(total.gpus, 0.75);
        assert_eq!(total.gpu_memory, Information::new::<byte>(0.0));
    }
}
