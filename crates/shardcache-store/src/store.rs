//! The dispatch router.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::action::{Action, ActionTag, Dispatch, GatewayAction};
use crate::error::{Result, StoreError};
use crate::layout::{ActionMapper, Handler, StoreLayout, gateway_mapper, no_op_mapper, read_mapper};
use crate::outcome::Outcome;

/// Executes actions by routing each to the handler registered for its tag.
///
/// Built once at startup from one or more layouts and passed to whoever
/// submits actions. Cloning is cheap and clones share no mutable state.
#[derive(Clone)]
pub struct Store {
    mapper: Arc<ActionMapper>,
}

impl Store {
    /// A store that acknowledges every built-in action and keeps nothing.
    pub fn no_op() -> Self {
        Self {
            mapper: Arc::new(no_op_mapper()),
        }
    }

    /// Build a store from a layout's accessor, updater and custom actions.
    ///
    /// Fails with `DuplicateHandler` if the layout's custom mapper claims a
    /// built-in tag.
    pub fn from_layout(layout: &dyn StoreLayout) -> Result<Self> {
        let flags = layout.enabled_flags();
        let mapper = ActionMapper::aggregate([
            read_mapper(layout.data_accessor(), flags),
            gateway_mapper(layout.gateway_data_updater(), flags),
            layout.custom_action_mapper(),
        ])?;
        debug!(
            handlers = mapper.len(),
            disabled = ?flags.disabled(),
            "store: built from layout"
        );
        Ok(Self {
            mapper: Arc::new(mapper),
        })
    }

    /// Build a store from several layouts. For each tag, the first layout
    /// that handles it wins.
    pub fn from_layouts(layouts: &[&dyn StoreLayout]) -> Result<Self> {
        let mut mappers = Vec::with_capacity(layouts.len());
        for layout in layouts {
            mappers.push(Self::from_layout(*layout)?.mapper.as_ref().clone());
        }
        Ok(Self {
            mapper: Arc::new(ActionMapper::merge_first(mappers)),
        })
    }

    /// Register a custom action handler. Fails if `name` is taken.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) -> Result<()> {
        let tag = ActionTag::Custom(name.into());
        if self.mapper.contains(&tag) {
            return Err(StoreError::DuplicateHandler(tag.to_string()));
        }
        Arc::make_mut(&mut self.mapper).insert(tag, handler);
        Ok(())
    }

    pub fn handles(&self, tag: &ActionTag) -> bool {
        self.mapper.contains(tag)
    }

    /// Run an action through its handler.
    pub async fn execute(&self, action: impl Into<Action>) -> Result<Outcome> {
        let action = action.into();
        let tag = action.tag();
        let Some(handler) = self.mapper.find(&tag) else {
            warn!(tag = %tag, "store: no handler registered");
            return Err(StoreError::UnhandledAction(tag.to_string()));
        };
        let handler = handler.clone();
        debug!(tag = %tag, "store: executing action");
        handler(action).await
    }

    /// Submit a gateway notification received on `shard`.
    pub async fn submit(&self, shard: u32, dispatch: Dispatch) -> Result<Outcome> {
        self.execute(GatewayAction::new(shard, dispatch)).await
    }
}
