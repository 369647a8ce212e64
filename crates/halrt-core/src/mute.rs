//! Mute control.

use std::sync::{Arc, Weak};

use halrt_sync::VersionedCell;

use crate::context::Context;
use crate::error::Error;
use crate::object::{ClassId, Object, ObjectCore, impl_object};
use crate::property::{ELEMENT_MAIN, Property, PropertyValue, Scope, Selector};

/// Mute control construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteControlParameters {
    /// Scope the control applies to.
    pub scope: Scope,
    /// Element the control applies to.
    pub element: u32,
    /// Initial state.
    pub is_muted: bool,
}

impl Default for MuteControlParameters {
    fn default() -> Self {
        Self {
            scope: Scope::Output,
            element: ELEMENT_MAIN,
            is_muted: false,
        }
    }
}

/// Boolean control that silences a stream.
pub struct MuteControl {
    core: ObjectCore,
    params: MuteControlParameters,
    is_muted: VersionedCell<bool>,
}

static PROPERTIES: &[Property<MuteControl>] = &[
    Property::read_only(Selector::CONTROL_SCOPE, |c, _| {
        Ok(PropertyValue::U32(c.scope().code()))
    }),
    Property::read_only(Selector::CONTROL_ELEMENT, |c, _| {
        Ok(PropertyValue::U32(c.element()))
    }),
    Property::settable(
        Selector::BOOLEAN_CONTROL_VALUE,
        |c, _| Ok(PropertyValue::Bool(c.is_muted())),
        |c, _, value| {
            let muted = value
                .as_bool()
                .ok_or(Error::IllegalOperation("expected a boolean"))?;
            c.set_muted(muted);
            Ok(())
        },
    ),
];

impl_object!(MuteControl, ClassId::MUTE_CONTROL, PROPERTIES);

impl MuteControl {
    /// Unmuted control in `scope`.
    pub fn new(context: &Arc<Context>, scope: Scope) -> Arc<Self> {
        Self::with_params(
            context,
            MuteControlParameters {
                scope,
                ..MuteControlParameters::default()
            },
        )
    }

    /// Control with explicit parameters.
    pub fn with_params(context: &Arc<Context>, params: MuteControlParameters) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn Object> = this.clone();
            Self {
                core: ObjectCore::new(context, "MuteControl", this),
                params,
                is_muted: VersionedCell::new(params.is_muted),
            }
        })
    }

    /// Scope the control applies to.
    pub fn scope(&self) -> Scope {
        self.params.scope
    }

    /// Element the control applies to.
    pub fn element(&self) -> u32 {
        self.params.element
    }

    /// Current state.
    pub fn is_muted(&self) -> bool {
        *self.is_muted.read()
    }

    /// Change state and notify the host. Setting the current value is a
    /// no-op.
    pub fn set_muted(&self, muted: bool) {
        if self.is_muted() == muted {
            return;
        }
        self.is_muted.write(muted);
        tracing::debug!(object_id = %self.core.id(), muted, "MuteControl: state changed");
        self.core.notify_property_changed(Selector::BOOLEAN_CONTROL_VALUE);
    }

    /// Zero `frames` if muted.
    pub fn apply_processing(&self, frames: &mut [f32]) {
        if self.is_muted() {
            frames.fill(0.0);
        }
    }
}

impl std::fmt::Debug for MuteControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuteControl")
            .field("id", &self.core.id())
            .field("scope", &self.params.scope)
            .field("is_muted", &self.is_muted())
            .finish()
    }
}
