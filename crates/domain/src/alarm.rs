//! Alarm types and the registry that binds each type to its trigger rules.
//!
//! The registry is built once at startup from [`AlarmSettings`] and is
//! immutable afterwards. Every registered type needs both an
//! [`AlarmDefinition`] and a [`TriggerClassifier`]; a missing half is a
//! [`ConfigurationError`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ValidationError};
use crate::model::{Model, ModelSnapshot};
use crate::predicate::TriggerPredicate;

/// Default grace period before an unconfirmed alert is promoted.
pub const DEFAULT_DWELL: Duration = Duration::from_secs(30);

/// Rule templates that make a place eligible for PANIC without a keypad.
pub const DEFAULT_PANIC_RULE_TEMPLATES: [&str; 2] = ["01e7de", "c2dd38"];

/// Call tree namespace shared by the alarm subsystem.
pub const ALARM_CALL_TREE: &str = "alarm";
/// Call tree namespace of the care subsystem.
pub const CARE_CALL_TREE: &str = "care";

/// Alarm category. Declaration order is priority order (CO first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmType {
    Co,
    Smoke,
    Panic,
    Security,
    Care,
    Water,
    Weather,
}

impl AlarmType {
    pub const ALL: [Self; 7] = [
        Self::Co,
        Self::Smoke,
        Self::Panic,
        Self::Security,
        Self::Care,
        Self::Water,
        Self::Weather,
    ];

    /// Types that skip human confirmation and go straight to ALERT.
    #[must_use]
    pub fn auto_confirm(self) -> bool {
        matches!(self, Self::Co | Self::Panic)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Co => "CO",
            Self::Smoke => "SMOKE",
            Self::Panic => "PANIC",
            Self::Security => "SECURITY",
            Self::Care => "CARE",
            Self::Water => "WATER",
            Self::Weather => "WEATHER",
        }
    }
}

impl fmt::Display for AlarmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alarm| alarm.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownAlarmType(s.to_string()))
    }
}

/// What kind of device produced a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    Smoke,
    Co,
    Leak,
    Weather,
    Behavior,
    Motion,
    Contact,
    Glass,
    Keypad,
    Rule,
    Button,
}

/// Semantic meaning of a device change for one alarm type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorEvent {
    Triggered,
    Restored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub event: SensorEvent,
    pub source: TriggerSource,
}

/// Maps a changed model into a semantic sensor event for one alarm type.
pub trait TriggerClassifier: fmt::Debug + Send + Sync {
    /// Kind of device behind `model`, `None` if this type does not know it.
    fn source(&self, model: &Model) -> Option<TriggerSource>;

    /// `matched` is the type's trigger predicate evaluated on `model`;
    /// `was_triggering` tells whether `model` currently contributes to an
    /// open incident.
    fn classify(&self, model: &Model, matched: bool, was_triggering: bool) -> Option<Classification> {
        let event = match (matched, was_triggering) {
            (true, _) => SensorEvent::Triggered,
            (false, true) => SensorEvent::Restored,
            (false, false) => return None,
        };
        let source = self.source(model)?;
        Some(Classification { event, source })
    }
}

/// Classifier for single-sensor alarm types (smoke, CO, leak, weather, care).
#[derive(Debug, Clone, Copy)]
pub struct SafetyClassifier {
    source: TriggerSource,
}

impl SafetyClassifier {
    #[must_use]
    pub fn new(source: TriggerSource) -> Self {
        Self { source }
    }
}

impl TriggerClassifier for SafetyClassifier {
    fn source(&self, _model: &Model) -> Option<TriggerSource> {
        Some(self.source)
    }
}

/// Security triggers come from motion, contact (incl. motorized doors) or
/// glass-break sensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityClassifier;

impl TriggerClassifier for SecurityClassifier {
    fn source(&self, model: &Model) -> Option<TriggerSource> {
        if model.has_capability("mot") {
            Some(TriggerSource::Motion)
        } else if model.has_capability("cont") || model.has_capability("motdoor") {
            Some(TriggerSource::Contact)
        } else if model.has_capability("glass") {
            Some(TriggerSource::Glass)
        } else {
            None
        }
    }
}

/// Panic is raised from a keypad, a panic rule, or a plain button.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicClassifier;

impl TriggerClassifier for PanicClassifier {
    fn source(&self, model: &Model) -> Option<TriggerSource> {
        if model.has_capability("keypad") {
            Some(TriggerSource::Keypad)
        } else if model.has_capability("rule") {
            Some(TriggerSource::Rule)
        } else {
            Some(TriggerSource::Button)
        }
    }
}

/// Trigger rules for one alarm type.
#[derive(Debug, Clone)]
pub struct AlarmDefinition {
    pub alarm_type: AlarmType,
    pub trigger: TriggerPredicate,
    /// Extra eligibility rule: the type only applies to a place where some
    /// model satisfies it.
    pub gate: Option<TriggerPredicate>,
    pub dwell: Duration,
    pub call_tree: String,
}

impl AlarmDefinition {
    #[must_use]
    pub fn new(alarm_type: AlarmType, trigger: TriggerPredicate) -> Self {
        let call_tree = match alarm_type {
            AlarmType::Care => CARE_CALL_TREE,
            _ => ALARM_CALL_TREE,
        };
        Self {
            alarm_type,
            trigger,
            gate: None,
            dwell: DEFAULT_DWELL,
            call_tree: call_tree.to_string(),
        }
    }

    #[must_use]
    pub fn with_gate(mut self, gate: TriggerPredicate) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    /// Whether this type applies to the place the snapshot describes.
    #[must_use]
    pub fn is_applicable(&self, snapshot: &ModelSnapshot) -> bool {
        self.gate
            .as_ref()
            .is_none_or(|gate| gate.matches_any(snapshot.models()))
    }
}

/// Per-type overrides used to build the standard registry.
#[derive(Debug, Clone)]
pub struct AlarmSettings {
    pub dwell: HashMap<AlarmType, Duration>,
    pub predicates: HashMap<AlarmType, String>,
    pub panic_rule_templates: Vec<String>,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            dwell: HashMap::new(),
            predicates: HashMap::new(),
            panic_rule_templates: DEFAULT_PANIC_RULE_TEMPLATES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Built-in trigger text for each alarm type.
#[must_use]
pub fn default_predicate(alarm_type: AlarmType) -> &'static str {
    match alarm_type {
        AlarmType::Co => "base:caps contains 'co' and (co:co is supported and co:co = 'DETECTED')",
        AlarmType::Smoke => {
            "base:caps contains 'smoke' and (smoke:smoke is supported and smoke:smoke = 'DETECTED')"
        }
        AlarmType::Panic => {
            "(base:caps contains 'keypad' and (keypad:alarmState is supported and keypad:alarmState = 'PANIC')) \
             or (base:caps contains 'rule' and (rule:panic is supported and rule:panic = 'TRIGGERED')) \
             or (base:caps contains 'panic' and (panic:state is supported and panic:state = 'PRESSED'))"
        }
        AlarmType::Security => {
            "(base:caps contains 'mot' and (mot:motion is supported and mot:motion = 'DETECTED')) \
             or (base:caps contains 'cont' and (cont:contact is supported and cont:contact = 'OPENED')) \
             or (base:caps contains 'motdoor' and (motdoor:doorstate = 'OPEN' or motdoor:doorstate = 'OPENING' or motdoor:doorstate = 'OBSTRUCTION')) \
             or (base:caps contains 'glass' and (glass:break is supported and glass:break = 'DETECTED'))"
        }
        AlarmType::Care => {
            "base:caps contains 'subcare' and (subcare:alarmState is supported and subcare:alarmState = 'ALERT')"
        }
        AlarmType::Water => {
            "base:caps contains 'leakh2o' and (leakh2o:state is supported and leakh2o:state = 'LEAK')"
        }
        AlarmType::Weather => {
            "base:caps contains 'noaa' and (noaa:alertstate is supported and noaa:alertstate = 'ALERT')"
        }
    }
}

fn panic_gate(templates: &[String]) -> String {
    let mut gate = String::from("base:caps contains 'keypad'");
    if !templates.is_empty() {
        let alternatives = templates
            .iter()
            .map(|template| format!("rule:template = '{template}'"))
            .collect::<Vec<_>>()
            .join(" or ");
        gate.push_str(" or (base:caps contains 'rule' and (");
        gate.push_str(&alternatives);
        gate.push_str("))");
    }
    gate
}

fn compile_for(alarm_type: AlarmType, text: &str) -> Result<TriggerPredicate, ConfigurationError> {
    TriggerPredicate::compile(text)
        .map_err(|source| ConfigurationError::InvalidPredicate { alarm_type, source })
}

#[derive(Debug, Clone)]
struct RegisteredAlarm {
    definition: AlarmDefinition,
    classifier: Arc<dyn TriggerClassifier>,
}

/// Immutable lookup from alarm type to its trigger rules and classifier.
#[derive(Debug, Clone)]
pub struct AlarmRegistry {
    alarms: BTreeMap<AlarmType, RegisteredAlarm>,
}

impl AlarmRegistry {
    #[must_use]
    pub fn builder() -> AlarmRegistryBuilder {
        AlarmRegistryBuilder::default()
    }

    /// Registry with the built-in rules for every alarm type.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidPredicate`] when an overridden
    /// predicate (or a panic rule template) does not compile.
    pub fn standard(settings: &AlarmSettings) -> Result<Self, ConfigurationError> {
        let mut builder = Self::builder();
        for alarm_type in AlarmType::ALL {
            let text = settings
                .predicates
                .get(&alarm_type)
                .map_or_else(|| default_predicate(alarm_type), String::as_str);
            let mut definition = AlarmDefinition::new(alarm_type, compile_for(alarm_type, text)?);
            if let Some(dwell) = settings.dwell.get(&alarm_type) {
                definition = definition.with_dwell(*dwell);
            }
            if alarm_type == AlarmType::Panic {
                let gate = panic_gate(&settings.panic_rule_templates);
                definition = definition.with_gate(compile_for(alarm_type, &gate)?);
            }
            builder = builder.define(definition);
        }
        builder
            .classifier(AlarmType::Co, SafetyClassifier::new(TriggerSource::Co))
            .classifier(AlarmType::Smoke, SafetyClassifier::new(TriggerSource::Smoke))
            .classifier(AlarmType::Panic, PanicClassifier)
            .classifier(AlarmType::Security, SecurityClassifier)
            .classifier(AlarmType::Care, SafetyClassifier::new(TriggerSource::Behavior))
            .classifier(AlarmType::Water, SafetyClassifier::new(TriggerSource::Leak))
            .classifier(AlarmType::Weather, SafetyClassifier::new(TriggerSource::Weather))
            .build()
    }

    #[must_use]
    pub fn definition(&self, alarm_type: AlarmType) -> Option<&AlarmDefinition> {
        self.alarms.get(&alarm_type).map(|alarm| &alarm.definition)
    }

    #[must_use]
    pub fn classifier(&self, alarm_type: AlarmType) -> Option<&dyn TriggerClassifier> {
        self.alarms
            .get(&alarm_type)
            .map(|alarm| alarm.classifier.as_ref())
    }

    /// Registered definitions in priority order.
    pub fn definitions(&self) -> impl Iterator<Item = &AlarmDefinition> {
        self.alarms.values().map(|alarm| &alarm.definition)
    }

    /// Types that apply to the place described by `snapshot`, in priority order.
    #[must_use]
    pub fn applicable(&self, snapshot: &ModelSnapshot) -> Vec<AlarmType> {
        self.definitions()
            .filter(|definition| definition.is_applicable(snapshot))
            .map(|definition| definition.alarm_type)
            .collect()
    }
}

/// Step-by-step builder for [`AlarmRegistry`].
#[derive(Debug, Default)]
pub struct AlarmRegistryBuilder {
    definitions: BTreeMap<AlarmType, AlarmDefinition>,
    classifiers: BTreeMap<AlarmType, Arc<dyn TriggerClassifier>>,
}

impl AlarmRegistryBuilder {
    #[must_use]
    pub fn define(mut self, definition: AlarmDefinition) -> Self {
        self.definitions.insert(definition.alarm_type, definition);
        self
    }

    #[must_use]
    pub fn classifier(
        mut self,
        alarm_type: AlarmType,
        classifier: impl TriggerClassifier + 'static,
    ) -> Self {
        self.classifiers.insert(alarm_type, Arc::new(classifier));
        self
    }

    /// Pair every definition with its classifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingClassifier`] for a defined type
    /// without classifier and [`ConfigurationError::MissingDefinition`] for a
    /// classifier registered against an undefined type.
    pub fn build(mut self) -> Result<AlarmRegistry, ConfigurationError> {
        if let Some(orphan) = self
            .classifiers
            .keys()
            .find(|alarm_type| !self.definitions.contains_key(*alarm_type))
        {
            return Err(ConfigurationError::MissingDefinition(*orphan));
        }
        let mut alarms = BTreeMap::new();
        for (alarm_type, definition) in self.definitions {
            let classifier = self
                .classifiers
                .remove(&alarm_type)
                .ok_or(ConfigurationError::MissingClassifier(alarm_type))?;
            alarms.insert(
                alarm_type,
                RegisteredAlarm {
                    definition,
                    classifier,
                },
            );
        }
        Ok(AlarmRegistry { alarms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::PlaceId;

    fn smoke_detector(state: &str) -> Model {
        Model::new("DRIV:dev:smoke")
            .with_capabilities(["base", "smoke"])
            .with("smoke:smoke", state)
    }

    #[test]
    fn should_auto_confirm_only_co_and_panic() {
        let auto: Vec<AlarmType> = AlarmType::ALL
            .into_iter()
            .filter(|alarm| alarm.auto_confirm())
            .collect();
        assert_eq!(auto, vec![AlarmType::Co, AlarmType::Panic]);
    }

    #[test]
    fn should_order_types_by_priority() {
        let mut shuffled = vec![AlarmType::Weather, AlarmType::Security, AlarmType::Co];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![AlarmType::Co, AlarmType::Security, AlarmType::Weather]
        );
    }

    #[test]
    fn should_parse_alarm_type_case_insensitively() {
        assert_eq!("smoke".parse::<AlarmType>().unwrap(), AlarmType::Smoke);
        assert_eq!("CO".parse::<AlarmType>().unwrap(), AlarmType::Co);
        assert!("fire".parse::<AlarmType>().is_err());
    }

    #[test]
    fn should_serialize_alarm_type_upper_case() {
        assert_eq!(serde_json::to_string(&AlarmType::Co).unwrap(), "\"CO\"");
        let parsed: AlarmType = serde_json::from_str("\"SECURITY\"").unwrap();
        assert_eq!(parsed, AlarmType::Security);
    }

    #[test]
    fn should_compile_every_default_predicate() {
        let registry = AlarmRegistry::standard(&AlarmSettings::default()).unwrap();
        assert_eq!(registry.definitions().count(), AlarmType::ALL.len());
        for alarm_type in AlarmType::ALL {
            assert!(registry.classifier(alarm_type).is_some());
        }
    }

    #[test]
    fn should_fail_fast_when_classifier_missing() {
        let predicate = TriggerPredicate::compile(default_predicate(AlarmType::Smoke)).unwrap();
        let result = AlarmRegistry::builder()
            .define(AlarmDefinition::new(AlarmType::Smoke, predicate))
            .build();
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingClassifier(AlarmType::Smoke))
        ));
    }

    #[test]
    fn should_fail_fast_when_definition_missing() {
        let result = AlarmRegistry::builder()
            .classifier(AlarmType::Water, SafetyClassifier::new(TriggerSource::Leak))
            .build();
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingDefinition(AlarmType::Water))
        ));
    }

    #[test]
    fn should_report_invalid_predicate_override() {
        let mut settings = AlarmSettings::default();
        settings
            .predicates
            .insert(AlarmType::Water, "leakh2o:state ==".to_string());
        let result = AlarmRegistry::standard(&settings);
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidPredicate {
                alarm_type: AlarmType::Water,
                ..
            })
        ));
    }

    #[test]
    fn should_apply_dwell_override() {
        let mut settings = AlarmSettings::default();
        settings
            .dwell
            .insert(AlarmType::Security, Duration::from_secs(45));
        let registry = AlarmRegistry::standard(&settings).unwrap();
        let security = registry.definition(AlarmType::Security).unwrap();
        assert_eq!(security.dwell, Duration::from_secs(45));
        let smoke = registry.definition(AlarmType::Smoke).unwrap();
        assert_eq!(smoke.dwell, DEFAULT_DWELL);
    }

    #[test]
    fn should_match_smoke_detector_only_when_detected() {
        let registry = AlarmRegistry::standard(&AlarmSettings::default()).unwrap();
        let smoke = registry.definition(AlarmType::Smoke).unwrap();
        assert!(smoke.trigger.matches(&smoke_detector("DETECTED")));
        assert!(!smoke.trigger.matches(&smoke_detector("SAFE")));
    }

    #[test]
    fn should_gate_panic_on_keypad_or_template_rule() {
        let registry = AlarmRegistry::standard(&AlarmSettings::default()).unwrap();
        let place = PlaceId::new();

        let bare = ModelSnapshot::new(place, [smoke_detector("SAFE")]);
        assert!(!registry.applicable(&bare).contains(&AlarmType::Panic));

        let keypad = ModelSnapshot::new(
            place,
            [Model::new("DRIV:dev:kp").with_capabilities(["keypad"])],
        );
        assert!(registry.applicable(&keypad).contains(&AlarmType::Panic));

        let rule = ModelSnapshot::new(
            place,
            [Model::new("SERV:rule:1")
                .with_capabilities(["rule"])
                .with("rule:template", "c2dd38")],
        );
        assert!(registry.applicable(&rule).contains(&AlarmType::Panic));

        let other_rule = ModelSnapshot::new(
            place,
            [Model::new("SERV:rule:2")
                .with_capabilities(["rule"])
                .with("rule:template", "ffffff")],
        );
        assert!(!registry.applicable(&other_rule).contains(&AlarmType::Panic));
    }

    #[test]
    fn should_list_applicable_types_in_priority_order() {
        let registry = AlarmRegistry::standard(&AlarmSettings::default()).unwrap();
        let snapshot = ModelSnapshot::new(PlaceId::new(), []);
        let applicable = registry.applicable(&snapshot);
        assert_eq!(applicable.first(), Some(&AlarmType::Co));
        assert!(!applicable.contains(&AlarmType::Panic));
    }

    #[test]
    fn should_route_care_to_its_own_call_tree() {
        let registry = AlarmRegistry::standard(&AlarmSettings::default()).unwrap();
        assert_eq!(
            registry.definition(AlarmType::Care).unwrap().call_tree,
            CARE_CALL_TREE
        );
        assert_eq!(
            registry.definition(AlarmType::Co).unwrap().call_tree,
            ALARM_CALL_TREE
        );
    }

    #[test]
    fn should_classify_security_sources_by_capability() {
        let motion = Model::new("DRIV:dev:m").with_capabilities(["mot"]);
        let door = Model::new("DRIV:dev:d").with_capabilities(["motdoor"]);
        let glass = Model::new("DRIV:dev:g").with_capabilities(["glass"]);
        let lamp = Model::new("DRIV:dev:l").with_capabilities(["swit"]);
        assert_eq!(
            SecurityClassifier.source(&motion),
            Some(TriggerSource::Motion)
        );
        assert_eq!(
            SecurityClassifier.source(&door),
            Some(TriggerSource::Contact)
        );
        assert_eq!(SecurityClassifier.source(&glass), Some(TriggerSource::Glass));
        assert_eq!(SecurityClassifier.source(&lamp), None);
    }

    #[test]
    fn should_classify_triggered_and_restored() {
        let classifier = SafetyClassifier::new(TriggerSource::Smoke);
        let model = smoke_detector("DETECTED");
        assert_eq!(
            classifier.classify(&model, true, false),
            Some(Classification {
                event: SensorEvent::Triggered,
                source: TriggerSource::Smoke
            })
        );
        assert_eq!(
            classifier.classify(&model, false, true).map(|c| c.event),
            Some(SensorEvent::Restored)
        );
        assert_eq!(classifier.classify(&model, false, false), None);
    }
}
