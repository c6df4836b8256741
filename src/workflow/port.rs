//! Port references carried by edge handles.

use std::{fmt, str::FromStr};

use crate::NodeflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A parsed handle such as `output-0` or `input-3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub direction: PortDirection,
    pub index: u32,
}

impl PortRef {
    pub fn input(index: u32) -> Self {
        Self {
            direction: PortDirection::Input,
            index,
        }
    }

    pub fn output(index: u32) -> Self {
        Self {
            direction: PortDirection::Output,
            index,
        }
    }

    /// Parse `handle` and keep it only if it points in `direction`.
    pub fn parse_as(
        handle: &str,
        direction: PortDirection,
    ) -> Option<Self> {
        handle.parse::<Self>().ok().filter(|p| p.direction == direction)
    }
}

impl FromStr for PortRef {
    type Err = NodeflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (direction, index) = s.rsplit_once('-').ok_or_else(|| NodeflowError::Edge(format!("invalid port handle '{}'", s)))?;
        let direction = direction.parse::<PortDirection>().map_err(|_| NodeflowError::Edge(format!("invalid port direction in '{}'", s)))?;
        let index = index.parse::<u32>().map_err(|_| NodeflowError::Edge(format!("invalid port index in '{}'", s)))?;

        Ok(Self {
            direction,
            index,
        })
    }
}

impl fmt::Display for PortRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}-{}", self.direction.as_ref(), self.index)
    }
}
