//! Action dispatch.
//!
//! An inbound call is an action name plus named string arguments; the answer
//! is either named string outputs or a numeric error code.

use std::collections::HashMap;

use mediacat_common::{BrowseWindow, Error, ObjectId};
use thiserror::Error as ThisError;
use tracing::{debug, trace};

use super::{BrowseFlag, BrowseResponse, ContentDirectory};

/// Named string arguments of one call.
pub type ActionArgs = HashMap<String, String>;

/// Named string outputs, in the order the action declares them.
pub type ActionOutputs = Vec<(&'static str, String)>;

/// Value returned by `GetSearchCapabilities`.
pub const SEARCH_CAPABILITIES: &str = "upnp:class";
/// Value returned by `GetSortCapabilities`.
pub const SORT_CAPABILITIES: &str = "dc:title";

/// Numeric failure of one action call.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{code} {description}")]
pub struct ActionError {
    pub code: u16,
    pub description: String,
}

impl From<Error> for ActionError {
    fn from(err: Error) -> Self {
        Self {
            code: err.action_code(),
            description: err.to_string(),
        }
    }
}

impl ContentDirectory {
    /// Run `action` with `args`.
    pub fn dispatch(&self, action: &str, args: &ActionArgs) -> Result<ActionOutputs, ActionError> {
        debug!("Action {} ({} args)", action, args.len());
        let outputs = match action {
            "GetSearchCapabilities" => vec![("SearchCaps", SEARCH_CAPABILITIES.to_string())],
            "GetSortCapabilities" => vec![("SortCaps", SORT_CAPABILITIES.to_string())],
            "GetSystemUpdateID" | "GetSystemUpdateId" => {
                vec![("Id", self.system_update_id().to_string())]
            }
            "Browse" => self.browse_action(args)?,
            "Search" => self.search_action(args)?,
            other => return Err(Error::InvalidAction(other.to_string()).into()),
        };
        Ok(outputs)
    }

    fn browse_action(&self, args: &ActionArgs) -> Result<ActionOutputs, Error> {
        let id = ObjectId::new(required(args, "ObjectID")?);
        let flag: BrowseFlag = required(args, "BrowseFlag")?.parse()?;
        let window = window(args)?;
        accept_unused(args);
        Ok(outputs(self.browse(&id, flag, window)?))
    }

    fn search_action(&self, args: &ActionArgs) -> Result<ActionOutputs, Error> {
        let id = ObjectId::new(required(args, "ContainerID")?);
        let criteria = required(args, "SearchCriteria")?;
        let window = window(args)?;
        accept_unused(args);
        Ok(outputs(self.search(&id, criteria, window)?))
    }
}

fn required<'a>(args: &'a ActionArgs, name: &str) -> Result<&'a str, Error> {
    args.get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidArgs(format!("missing {name}")))
}

fn number(args: &ActionArgs, name: &str) -> Result<u32, Error> {
    let raw = required(args, name)?;
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidArgs(format!("{name} is not a number: '{raw}'")))
}

fn window(args: &ActionArgs) -> Result<BrowseWindow, Error> {
    Ok(BrowseWindow::new(
        number(args, "StartingIndex")?,
        number(args, "RequestedCount")?,
    ))
}

// Results always carry every field and are always ordered by title.
fn accept_unused(args: &ActionArgs) {
    for name in ["Filter", "SortCriteria"] {
        if let Some(value) = args.get(name).filter(|v| !v.is_empty()) {
            trace!("Ignoring {}='{}'", name, value);
        }
    }
}

fn outputs(resp: BrowseResponse) -> ActionOutputs {
    vec![
        ("Result", resp.result),
        ("NumberReturned", resp.number_returned.to_string()),
        ("TotalMatches", resp.total_matches.to_string()),
        ("UpdateID", resp.update_id.to_string()),
    ]
}
