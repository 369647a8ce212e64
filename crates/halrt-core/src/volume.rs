//! Volume control and its raw/scalar/decibel curve.
//!
//! A volume is stored as an integer raw step. The curve maps the raw range
//! linearly onto both the 0..=1 scalar scale and the decibel range, so all
//! three scales convert into each other without loss beyond raw rounding.

use std::sync::{Arc, Weak};

use halrt_sync::VersionedCell;

use crate::context::Context;
use crate::error::Error;
use crate::format::ValueRange;
use crate::object::{ClassId, Object, ObjectCore, impl_object};
use crate::property::{ELEMENT_MAIN, Property, PropertyValue, Scope, Selector};

/// Linear mapping between raw steps, scalar values, and decibels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeCurve {
    min_raw: i32,
    max_raw: i32,
    min_db: f32,
    max_db: f32,
}

impl VolumeCurve {
    /// Curve over `min_raw..=max_raw` and `min_db..=max_db`. Reversed
    /// bounds are swapped.
    pub fn new(min_raw: i32, max_raw: i32, min_db: f32, max_db: f32) -> Self {
        Self {
            min_raw: min_raw.min(max_raw),
            max_raw: min_raw.max(max_raw),
            min_db: min_db.min(max_db),
            max_db: min_db.max(max_db),
        }
    }

    /// Lowest raw step.
    pub fn min_raw(&self) -> i32 {
        self.min_raw
    }

    /// Highest raw step.
    pub fn max_raw(&self) -> i32 {
        self.max_raw
    }

    /// Decibel bounds.
    pub fn decibel_range(&self) -> ValueRange {
        ValueRange::new(f64::from(self.min_db), f64::from(self.max_db))
    }

    /// `raw` limited to the raw range.
    pub fn clamp_raw(&self, raw: i32) -> i32 {
        raw.clamp(self.min_raw, self.max_raw)
    }

    fn raw_span(&self) -> f32 {
        (i64::from(self.max_raw) - i64::from(self.min_raw)) as f32
    }

    /// Position of `raw` on the 0..=1 scale.
    pub fn raw_to_scalar(&self, raw: i32) -> f32 {
        let span = self.raw_span();
        if span == 0.0 {
            return 1.0;
        }
        (i64::from(self.clamp_raw(raw)) - i64::from(self.min_raw)) as f32 / span
    }

    /// Nearest raw step for `scalar`, clamped to 0..=1 first.
    pub fn scalar_to_raw(&self, scalar: f32) -> i32 {
        let scalar = if scalar.is_nan() { 0.0 } else { scalar.clamp(0.0, 1.0) };
        let offset = (scalar * self.raw_span()).round() as i64;
        self.clamp_raw(i32::try_from(i64::from(self.min_raw) + offset).unwrap_or(self.max_raw))
    }

    /// Decibel value of `raw`.
    pub fn raw_to_db(&self, raw: i32) -> f32 {
        self.scalar_to_db(self.raw_to_scalar(raw))
    }

    /// Nearest raw step for `db`, clamped to the decibel range first.
    pub fn db_to_raw(&self, db: f32) -> i32 {
        self.scalar_to_raw(self.db_to_scalar(db))
    }

    /// Decibel value at `scalar`.
    pub fn scalar_to_db(&self, scalar: f32) -> f32 {
        let scalar = if scalar.is_nan() { 0.0 } else { scalar.clamp(0.0, 1.0) };
        self.min_db + scalar * (self.max_db - self.min_db)
    }

    /// Scalar position of `db`.
    pub fn db_to_scalar(&self, db: f32) -> f32 {
        let span = self.max_db - self.min_db;
        if span == 0.0 || db.is_nan() {
            return 1.0;
        }
        (db.clamp(self.min_db, self.max_db) - self.min_db) / span
    }
}

/// Volume control construction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeControlParameters {
    /// Scope the control applies to.
    pub scope: Scope,
    /// Element the control applies to.
    pub element: u32,
    /// Lowest raw step.
    pub min_raw: i32,
    /// Highest raw step; also the initial volume.
    pub max_raw: i32,
    /// Decibels at the lowest step.
    pub min_db: f32,
    /// Decibels at the highest step.
    pub max_db: f32,
}

impl Default for VolumeControlParameters {
    fn default() -> Self {
        Self {
            scope: Scope::Output,
            element: ELEMENT_MAIN,
            min_raw: 0,
            max_raw: 96,
            min_db: -96.0,
            max_db: 0.0,
        }
    }
}

/// Level control that scales a stream's samples.
pub struct VolumeControl {
    core: ObjectCore,
    params: VolumeControlParameters,
    curve: VolumeCurve,
    raw: VersionedCell<i32>,
}

fn expect_level(value: &PropertyValue) -> Result<f32, Error> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or(Error::IllegalOperation("expected a level"))
}

static PROPERTIES: &[Property<VolumeControl>] = &[
    Property::read_only(Selector::CONTROL_SCOPE, |c, _| {
        Ok(PropertyValue::U32(c.scope().code()))
    }),
    Property::read_only(Selector::CONTROL_ELEMENT, |c, _| {
        Ok(PropertyValue::U32(c.element()))
    }),
    Property::settable(
        Selector::LEVEL_SCALAR_VALUE,
        |c, _| Ok(PropertyValue::F64(f64::from(c.scalar_value()))),
        |c, _, value| {
            c.set_scalar_value(expect_level(&value)?);
            Ok(())
        },
    ),
    Property::settable(
        Selector::LEVEL_DECIBEL_VALUE,
        |c, _| Ok(PropertyValue::F64(f64::from(c.decibel_value()))),
        |c, _, value| {
            c.set_decibel_value(expect_level(&value)?);
            Ok(())
        },
    ),
    Property::read_only(Selector::LEVEL_DECIBEL_RANGE, |c, _| {
        Ok(PropertyValue::ValueRanges(vec![c.decibel_range()]))
    }),
];

impl_object!(VolumeControl, ClassId::VOLUME_CONTROL, PROPERTIES);

impl VolumeControl {
    /// Full-volume control in `scope`.
    pub fn new(context: &Arc<Context>, scope: Scope) -> Arc<Self> {
        Self::with_params(
            context,
            VolumeControlParameters {
                scope,
                ..VolumeControlParameters::default()
            },
        )
    }

    /// Control with explicit parameters.
    pub fn with_params(context: &Arc<Context>, params: VolumeControlParameters) -> Arc<Self> {
        let curve = VolumeCurve::new(params.min_raw, params.max_raw, params.min_db, params.max_db);
        Arc::new_cyclic(|this: &Weak<Self>| {
            let this: Weak<dyn Object> = this.clone();
            Self {
                core: ObjectCore::new(context, "VolumeControl", this),
                params,
                curve,
                raw: VersionedCell::new(curve.max_raw()),
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

    /// The control's curve.
    pub fn curve(&self) -> &VolumeCurve {
        &self.curve
    }

    /// Current raw step.
    pub fn raw_value(&self) -> i32 {
        *self.raw.read()
    }

    /// Move to raw step `raw`, clamped to the curve, and notify the host.
    /// Setting the current step is a no-op.
    pub fn set_raw_value(&self, raw: i32) {
        let raw = self.curve.clamp_raw(raw);
        if self.raw_value() == raw {
            return;
        }
        self.raw.write(raw);
        tracing::debug!(object_id = %self.core.id(), raw, "VolumeControl: level changed");
        self.core.notify_properties_changed(
            &[Selector::LEVEL_SCALAR_VALUE, Selector::LEVEL_DECIBEL_VALUE],
            self.scope(),
            self.element(),
        );
    }

    /// Current value on the 0..=1 scale.
    pub fn scalar_value(&self) -> f32 {
        self.curve.raw_to_scalar(self.raw_value())
    }

    /// Set the value on the 0..=1 scale.
    pub fn set_scalar_value(&self, scalar: f32) {
        self.set_raw_value(self.curve.scalar_to_raw(scalar));
    }

    /// Current value in decibels.
    pub fn decibel_value(&self) -> f32 {
        self.curve.raw_to_db(self.raw_value())
    }

    /// Set the value in decibels.
    pub fn set_decibel_value(&self, db: f32) {
        self.set_raw_value(self.curve.db_to_raw(db));
    }

    /// Decibel bounds of the control.
    pub fn decibel_range(&self) -> ValueRange {
        self.curve.decibel_range()
    }

    /// Scale `frames` by the scalar value, limiting samples to -1..=1.
    pub fn apply_processing(&self, frames: &mut [f32]) {
        let gain = self.scalar_value();
        if gain == 1.0 {
            return;
        }
        for sample in frames.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }
}

impl std::fmt::Debug for VolumeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeControl")
            .field("id", &self.core.id())
            .field("scope", &self.params.scope)
            .field("raw", &self.raw_value())
            .finish()
    }
}
