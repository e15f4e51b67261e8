use crate::config::ModelParams;
use crate::dims::Dims;
use crate::error::{ConfigError, EngineError};
use crate::io::{DataProvider, InputData};
use crate::model::hospital::HospitalisationModel;
use crate::model::infection::{ContactRegimes, InfectionModel};
use crate::model::progression::ProgressionModel;
use crate::model::testing::{TestCapacity, TestingModel, TestingPolicy};
use crate::model::RateModel;
use crate::policy::QuarantinePolicy;
use crate::rates::RateComposer;
use crate::state::StateTensor;

/// One fully validated run: parameters, sub-models, policies and initial
/// state. Owns everything it needs, so independent scenarios can run on
/// different threads.
pub struct Scenario {
    pub(crate) params: ModelParams,
    pub(crate) composer: RateComposer,
    pub(crate) quarantine: Box<dyn QuarantinePolicy>,
    pub(crate) testing_policy: Box<dyn TestingPolicy>,
    pub(crate) capacity: Box<dyn TestCapacity>,
    pub(crate) initial: StateTensor,
    basic_reproduction_number: f64,
}

impl Scenario {
    pub fn new(params: ModelParams, data: &InputData) -> Result<Self, EngineError> {
        params.check()?;
        let dims = params.dims;
        data.validate(dims.n_age)?;

        let contacts = ContactRegimes {
            baseline: data.contact_baseline.clone(),
            distancing: data.contact_distancing.clone(),
            isolation: data.contact_isolation_or_zero(),
        };
        let infection =
            InfectionModel::new(dims, &params.infection, contacts, &data.population_share())?;
        let progression = ProgressionModel::new(
            dims,
            &params.progression,
            &data.relative_death_risk,
            &data.relative_recovery_speed,
        )?;
        let hospital = HospitalisationModel::new(
            dims,
            &params.hospital,
            &data.hospital_admission_rate,
            &data.hospital_discharge_rate,
            &data.relative_admission_risk,
        )?;
        let testing = TestingModel::new(dims, &params.testing)?;

        let mut initial = StateTensor::from_demographics(
            dims,
            &data.age_population,
            &hospital.equilibrium_ratio(),
            &data.staff_ratio,
        )?;
        for (age, n) in params.initial_exposed.iter().enumerate() {
            if *n > 0.0 {
                initial.seed_exposed(age, *n)?;
            }
        }

        let r0 = infection.basic_reproduction_number(&progression, &data.age_population);
        tracing::info!(
            n_age = dims.n_age,
            cells = dims.n_cells(),
            population = initial.total(),
            hospital_mixing = infection.hospital_mixing(),
            r0,
            "scenario ready"
        );

        Ok(Self {
            composer: RateComposer::new(vec![
                Box::new(infection),
                Box::new(progression),
                Box::new(hospital),
                Box::new(testing),
            ]),
            quarantine: Box::new(params.quarantine.clone()),
            testing_policy: params.testing.policy.build(),
            capacity: params.testing.capacity.build(),
            initial,
            basic_reproduction_number: r0,
            params,
        })
    }

    pub fn from_provider(params: ModelParams, provider: &dyn DataProvider) -> anyhow::Result<Self> {
        let data = provider.load()?;
        Ok(Self::new(params, &data)?)
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn dims(&self) -> Dims {
        self.params.dims
    }

    pub fn initial_state(&self) -> &StateTensor {
        &self.initial
    }

    /// Under baseline contacts, computed when the scenario was built.
    pub fn basic_reproduction_number(&self) -> f64 {
        self.basic_reproduction_number
    }

    pub fn with_models(mut self, models: Vec<Box<dyn RateModel>>) -> Self {
        self.composer = RateComposer::new(models);
        self
    }

    pub fn with_quarantine_policy(mut self, policy: impl QuarantinePolicy + 'static) -> Self {
        self.quarantine = Box::new(policy);
        self
    }

    pub fn with_testing_policy(mut self, policy: impl TestingPolicy + 'static) -> Self {
        self.testing_policy = Box::new(policy);
        self
    }

    pub fn with_test_capacity(mut self, capacity: impl TestCapacity + 'static) -> Self {
        self.capacity = Box::new(capacity);
        self
    }

    pub fn with_total_days(mut self, total_days: u32) -> Self {
        self.params.total_days = total_days;
        self
    }

    pub fn with_initial_state(mut self, state: StateTensor) -> Result<Self, ConfigError> {
        if state.dims() != self.dims() {
            return Err(ConfigError::invalid(
                "initial state",
                format!(
                    "dimensions {:?} do not match the scenario's {:?}",
                    state.dims(),
                    self.dims()
                ),
            ));
        }
        state.check_occupancy("initial state")?;
        self.initial = state;
        Ok(self)
    }
}
