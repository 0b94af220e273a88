//! User choices that may still be the "nothing selected" placeholder.

use sidelink_common::{Error, Offer, Result};

use crate::media::MediaDevice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    Placeholder,
    Chosen(T),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::Placeholder
    }
}

impl<T> Selection<T> {
    pub fn chosen(&self) -> Option<&T> {
        match self {
            Selection::Placeholder => None,
            Selection::Chosen(value) => Some(value),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Selection::Placeholder)
    }
}

impl<T> From<T> for Selection<T> {
    fn from(value: T) -> Self {
        Selection::Chosen(value)
    }
}

impl Selection<MediaDevice> {
    pub fn validate(&self) -> Result<&MediaDevice> {
        match self {
            Selection::Placeholder => Err(Error::validation("no device selected")),
            Selection::Chosen(device) if device.device_id.trim().is_empty() => Err(
                Error::validation(format!("device {:?} has no device id", device.label)),
            ),
            Selection::Chosen(device) => Ok(device),
        }
    }
}

impl Selection<Offer> {
    pub fn validate(&self) -> Result<&Offer> {
        match self {
            Selection::Placeholder => Err(Error::validation("no stream selected")),
            Selection::Chosen(offer) if !offer.is_complete() => Err(Error::validation(format!(
                "stream {:?} is missing its offerer or description",
                offer.label
            ))),
            Selection::Chosen(offer) => Ok(offer),
        }
    }
}
