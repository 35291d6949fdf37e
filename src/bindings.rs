//! WASM session facade for the TypeScript drivers (charting UI, REST
//! layer). Owns the parameter set and the current measurement; every
//! numerical operation delegates to the core modules. Structured results
//! cross the boundary through `serde-wasm-bindgen`.
//!
//! Returned arrays are owned copies: a WASM memory view would be
//! invalidated by any later allocation, and the JS side transfers these
//! buffers between workers.

use crate::correlation::{fuse_matches, match_segment, HandSegment, MatchParams, MatchResult};
use crate::movement::{compute_movement_amounts, MovementParams};
use crate::planline::{solve_plan_line, PlanConfig, PlanLineResult};
use crate::restoration::{InversionMode, RestorationBand, RestorationFilter};
use crate::signal::{Channel, EngineParams, Signal};
use crate::versine::ChordGeometry;
use crate::worksection::WorkSection;
use wasm_bindgen::prelude::*;

fn to_js_error(err: crate::error::EngineError) -> JsError {
    JsError::new(&err.to_string())
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsError> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsError::new(&e.to_string()))
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsError::new(&e.to_string()))
}

/// One processing session: parameters, the loaded measurement, and the
/// results computed so far.
#[wasm_bindgen]
pub struct RestorationSession {
    params: EngineParams,
    channel: Channel,
    measured: Option<Signal>,
    restored: Option<Signal>,
    plan: Option<PlanLineResult>,
    matches: Vec<MatchResult>,
}

#[wasm_bindgen]
impl RestorationSession {
    /// Create a session with default parameters for the left level channel.
    #[wasm_bindgen(constructor)]
    pub fn new() -> RestorationSession {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        RestorationSession {
            params: EngineParams::default(),
            channel: Channel::Level(crate::signal::Side::Left),
            measured: None,
            restored: None,
            plan: None,
            matches: Vec::new(),
        }
    }

    /// Replace the whole parameter set (a serialized `EngineParams`).
    pub fn set_params(&mut self, params: JsValue) -> Result<(), JsError> {
        self.params = from_js(params)?;
        Ok(())
    }

    pub fn get_params(&self) -> Result<JsValue, JsError> {
        to_js(&self.params)
    }

    /// Load a measurement for one channel (a serialized `Channel` tag plus
    /// the raw samples). Clears downstream results.
    pub fn load_measurement(
        &mut self,
        channel: JsValue,
        values: Vec<f64>,
        start_kp_m: f64,
    ) -> Result<(), JsError> {
        self.channel = from_js(channel)?;
        self.measured = Some(
            Signal::new(values, self.params.data_interval_m, start_kp_m)
                .map_err(to_js_error)?,
        );
        self.restored = None;
        self.plan = None;
        self.matches.clear();
        Ok(())
    }

    /// Run the restoration filter over the loaded measurement using the
    /// chord-inverse synthesis (the band falls back to the channel default).
    pub fn restore(&mut self) -> Result<(), JsError> {
        let measured = self
            .measured
            .as_ref()
            .ok_or_else(|| JsError::new("no measurement loaded"))?;
        let band = match (self.params.lambda_lower_m, self.params.lambda_upper_m) {
            (Some(lower), Some(upper)) => RestorationBand::new(lower, upper),
            _ => RestorationBand::default_for(self.channel.kind()),
        };
        let chord = ChordGeometry::new(
            self.params.chord_forward_m,
            self.params.chord_backward_m,
        );
        let mut filter = RestorationFilter::new(
            self.params.data_interval_m,
            band,
            InversionMode::ChordInverse(chord),
        )
        .map_err(to_js_error)?;
        self.restored = Some(filter.restore(measured).map_err(to_js_error)?);
        Ok(())
    }

    /// The restored waveform as an owned copy.
    pub fn get_restored(&self) -> Result<Vec<f64>, JsError> {
        Ok(self
            .restored
            .as_ref()
            .ok_or_else(|| JsError::new("restore() has not run"))?
            .values()
            .to_vec())
    }

    /// Match one hand segment against the restored waveform and remember
    /// it for fusion. Returns the serialized `MatchResult`.
    pub fn match_hand_segment(
        &mut self,
        values: Vec<f64>,
        start_kp_m: f64,
        spacing_m: f64,
    ) -> Result<JsValue, JsError> {
        let restored = self
            .restored
            .as_ref()
            .ok_or_else(|| JsError::new("restore() has not run"))?;
        let segment = HandSegment {
            start_kp_m,
            spacing_m,
            values,
            channel: self.channel,
        };
        let match_params = MatchParams {
            search_range_m: self.params.search_range_m,
            step_m: self.params.step_m,
            threshold: self.params.correlation_threshold,
        };
        let result =
            match_segment(restored, &segment, &match_params).map_err(to_js_error)?;
        self.matches.push(result.clone());
        to_js(&result)
    }

    /// Fuse every matched segment into a global offset.
    pub fn fuse_segments(&self) -> Result<JsValue, JsError> {
        to_js(&fuse_matches(&self.matches).map_err(to_js_error)?)
    }

    /// Solve the plan line (a serialized `PlanConfig`) over the restored
    /// waveform. Returns the plan values; infeasible indices and the
    /// upward ratio come from `get_plan_report`.
    pub fn solve_plan(&mut self, config: JsValue) -> Result<Vec<f64>, JsError> {
        let restored = self
            .restored
            .as_ref()
            .ok_or_else(|| JsError::new("restore() has not run"))?;
        let config: PlanConfig = from_js(config)?;
        let result = solve_plan_line(restored.values(), &config).map_err(to_js_error)?;
        let plan = result.plan.clone();
        self.plan = Some(result);
        Ok(plan)
    }

    pub fn get_plan_infeasible(&self) -> Result<Vec<u32>, JsError> {
        Ok(self
            .plan
            .as_ref()
            .ok_or_else(|| JsError::new("solve_plan() has not run"))?
            .infeasible
            .iter()
            .map(|&i| i as u32)
            .collect())
    }

    pub fn get_plan_upward_ratio(&self) -> Result<f64, JsError> {
        Ok(self
            .plan
            .as_ref()
            .ok_or_else(|| JsError::new("solve_plan() has not run"))?
            .upward_ratio)
    }

    /// Movement amounts for the solved plan against a serialized
    /// `WorkSection` and `MovementParams`.
    pub fn movement_amounts(
        &self,
        section: JsValue,
        params: JsValue,
    ) -> Result<JsValue, JsError> {
        let restored = self
            .restored
            .as_ref()
            .ok_or_else(|| JsError::new("restore() has not run"))?;
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| JsError::new("solve_plan() has not run"))?;
        let section: WorkSection = from_js(section)?;
        let params: MovementParams = from_js(params)?;
        let amounts = compute_movement_amounts(
            restored,
            &plan.plan,
            self.channel,
            None,
            None,
            &params,
            &section,
        )
        .map_err(to_js_error)?;
        to_js(&amounts)
    }
}

impl Default for RestorationSession {
    fn default() -> Self {
        Self::new()
    }
}
