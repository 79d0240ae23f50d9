//! Event handling and user interactions for beebot.
//!
//! This module provides functionality for handling stream events:
//! - Classifying raw events into reactions and commands
//! - Recording reactions in the counter store
//! - Answering `showme` commands

pub mod classifier;
pub mod recorder;
pub mod responder;

use serde_json::Value;
use tracing::instrument;

use crate::{
    base::types::Void,
    service::{db::DbClient, directory::DirectoryCache},
};

use classifier::{Action, Classifier};
use recorder::{Change, record_reaction};
use responder::Responder;

/// Classify, then persist or respond; one event at a time.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Classifier,
    responder: Responder,
    db: DbClient,
    directory: DirectoryCache,
}

impl Pipeline {
    pub fn new(classifier: Classifier, responder: Responder, db: DbClient, directory: DirectoryCache) -> Self {
        Self {
            classifier,
            responder,
            db,
            directory,
        }
    }

    /// Handles one raw event to completion.
    ///
    /// Only fatal errors are returned; everything else is logged where it happens.
    #[instrument(name = "Pipeline::handle", skip_all)]
    pub async fn handle(&self, raw: &Value) -> Void {
        match self.classifier.classify(raw).await {
            Action::ReactionAdded(reaction) => record_reaction(&reaction, Change::Added, &self.db, &self.directory).await,
            Action::ReactionRemoved(reaction) => record_reaction(&reaction, Change::Removed, &self.db, &self.directory).await,
            Action::Command(request) => self.responder.respond(&request).await,
            Action::Ignored => Ok(()),
        }
    }
}
