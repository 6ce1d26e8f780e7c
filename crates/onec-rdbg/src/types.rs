use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Identity of the debugger UI registered on the debug server.
///
/// Every backend call carries it: the server keys attachments, breakpoints and
/// the notification queue by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebugUi {
    pub id: String,
    pub infobase_alias: String,
}

/// Address of the debug server (`http://host:port/e1crdbg` on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebuggerOptions {
    pub foreground_ability: bool,
}

/// Outcome of the `attachDebugUI` handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachDebugUiResult {
    Registered,
    CredentialsRequired,
    FullCredentialsRequired,
    IbInDebug,
    NotRegistered,
    Unknown,
}

/// Kind of a running runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DebugTargetType {
    Unknown,
    Client,
    ManagedClient,
    WebClient,
    ComConnector,
    Server,
    ServerEmulation,
    WebService,
    HttpService,
    OData,
    Job,
    JobFileMode,
    MobileClient,
    MobileServer,
    MobileJobFileMode,
    MobileManagedClient,
    MobileManagedServer,
}

const TARGET_TYPES: &[(DebugTargetType, &str, &str)] = &[
    (DebugTargetType::Unknown, "Unknown", "Unknown kind"),
    (DebugTargetType::Client, "Client", "Thick client"),
    (DebugTargetType::ManagedClient, "ManagedClient", "Thin client"),
    (DebugTargetType::WebClient, "WebClient", "Web client"),
    (DebugTargetType::ComConnector, "ComConnector", "COM connection"),
    (DebugTargetType::Server, "Server", "Server"),
    (DebugTargetType::ServerEmulation, "ServerEmulation", "Server (file mode)"),
    (DebugTargetType::WebService, "WebService", "Web service"),
    (DebugTargetType::HttpService, "HttpService", "HTTP service"),
    (DebugTargetType::OData, "OData", "Standard OData interface"),
    (DebugTargetType::Job, "Job", "Background job"),
    (DebugTargetType::JobFileMode, "JobFileMode", "Background job (file mode)"),
    (DebugTargetType::MobileClient, "MobileClient", "Client (mobile application)"),
    (DebugTargetType::MobileServer, "MobileServer", "Server (mobile application)"),
    (
        DebugTargetType::MobileJobFileMode,
        "MobileJobFileMode",
        "Background job (mobile application)",
    ),
    (DebugTargetType::MobileManagedClient, "MobileManagedClient", "Mobile client"),
    (
        DebugTargetType::MobileManagedServer,
        "MobileManagedServer",
        "Standalone server (mobile client with offline mode)",
    ),
];

impl DebugTargetType {
    pub fn as_str(self) -> &'static str {
        TARGET_TYPES
            .iter()
            .find(|(ty, _, _)| *ty == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("Unknown")
    }

    /// Human-readable label shown in thread names and target listings.
    pub fn presentation(self) -> &'static str {
        TARGET_TYPES
            .iter()
            .find(|(ty, _, _)| *ty == self)
            .map(|(_, _, label)| *label)
            .unwrap_or("Unknown kind")
    }
}

impl fmt::Display for DebugTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown debug target type {0:?}")]
pub struct UnknownTargetType(pub String);

impl FromStr for DebugTargetType {
    type Err = UnknownTargetType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TARGET_TYPES
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(s.trim()))
            .map(|(ty, _, _)| *ty)
            .ok_or_else(|| UnknownTargetType(s.to_string()))
    }
}

/// Full description of a debug target as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugTargetId {
    pub id: String,
    pub seance_no: u32,
    pub target_type: DebugTargetType,
    pub user_name: String,
}

impl DebugTargetId {
    pub fn light(&self) -> DebugTargetIdLight {
        DebugTargetIdLight {
            id: self.id.clone(),
        }
    }

    pub fn display_user_name(&self) -> &str {
        if self.user_name.is_empty() {
            "Unknown user"
        } else {
            &self.user_name
        }
    }
}

/// The id-only form most commands accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DebugTargetIdLight {
    pub id: String,
}

impl From<&str> for DebugTargetIdLight {
    fn from(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    ConfigModule,
    ExtensionModule,
}

/// Identity of one source module: configuration object + property, optionally
/// inside a configuration extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleId {
    pub module_type: ModuleType,
    pub extension_name: Option<String>,
    pub object_id: String,
    pub property_id: String,
}

impl ModuleId {
    pub fn new(extension_name: Option<String>, object_id: String, property_id: String) -> Self {
        let extension_name = extension_name.filter(|name| !name.is_empty());
        let module_type = if extension_name.is_some() {
            ModuleType::ExtensionModule
        } else {
            ModuleType::ConfigModule
        };
        Self {
            module_type,
            extension_name,
            object_id,
            property_id,
        }
    }
}

/// One line breakpoint as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    pub line: u32,
    pub hit_count: u32,
    pub is_active: bool,
    pub condition: String,
    pub break_on_condition: bool,
    pub put_description: Option<String>,
    pub show_output_message: bool,
    pub continue_execution: bool,
}

/// The complete breakpoint set of one module. Sending it replaces whatever the
/// server held for that module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleBreakpoints {
    pub module: ModuleId,
    pub breakpoints: Vec<BreakpointInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RteFilterItem {
    pub include: bool,
    pub pattern: String,
}

/// Runtime-error stop settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RteFilter {
    pub stop_on_errors: bool,
    pub analyze_error_str: bool,
    pub str_template: Vec<RteFilterItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    Step,
    StepIn,
    StepOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Worked,
    Stopped,
    Unknown,
}

/// Per-target state reported back by a `step` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStateItem {
    pub target_id: DebugTargetIdLight,
    pub state: TargetState,
}

/// How the server should present an evaluated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewInterface {
    Context,
    Collection,
    Enum,
}

/// One step of an evaluation path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Expression(String),
    Property(String),
    Index(u32),
}

/// A single expression-evaluation command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalRequest {
    pub target_id: DebugTargetIdLight,
    /// 0 is the innermost frame.
    pub stack_level: u32,
    /// Correlation token echoed back in the matching result.
    pub result_id: String,
    pub interfaces: Vec<ViewInterface>,
    /// Empty for local-variable evaluation.
    pub path: Vec<PathStep>,
    pub max_text_size: u32,
    pub calc_waiting_time_ms: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueInfo {
    pub type_name: String,
    pub presentation: String,
    pub is_expandable: bool,
    pub is_indexed_collection: bool,
    pub collection_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: String,
    pub is_readable: bool,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextProperty {
    pub property: PropertyInfo,
    pub value: ValueInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationResult {
    pub view_interface: ViewInterface,
    pub context_properties: Vec<ContextProperty>,
    pub collection_items: Vec<ValueInfo>,
    pub enum_values: Vec<ValueInfo>,
}

impl CalculationResult {
    pub fn empty(view_interface: ViewInterface) -> Self {
        Self {
            view_interface,
            context_properties: Vec::new(),
            collection_items: Vec::new(),
            enum_values: Vec::new(),
        }
    }
}

/// One evaluated expression, delivered either in the command reply or later via
/// an `ExprEvaluated` notification carrying the same `result_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub result_id: String,
    pub error_occurred: bool,
    pub exception: String,
    pub value: ValueInfo,
    pub calculation: CalculationResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackItem {
    pub presentation: String,
    pub line_no: u32,
    pub module: ModuleId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStackFormed {
    pub target_id: DebugTargetIdLight,
    /// Innermost frame last.
    pub call_stack: Option<Vec<StackItem>>,
    pub stop_by_bp: bool,
    pub suspended_by_other: bool,
    pub message: Option<String>,
    pub send_message_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub target_id: DebugTargetIdLight,
    /// Innermost frame last.
    pub call_stack: Option<Vec<StackItem>>,
    pub description: String,
}

/// Kinds of server-originated notifications (`DbguiExtCmds`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Unknown,
    TargetStarted,
    TargetQuit,
    CallStackFormed,
    ExprEvaluated,
    RteProcessing,
    CorrectedBp,
    RteOnBpConditionProcessing,
    MeasureResultProcessing,
    ValueModified,
    ErrorViewInfo,
    ForegroundHelperSet,
    ForegroundHelperRequest,
    ForegroundHelperProcess,
    ShowMetadataObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationBody {
    None,
    CallStackFormed(CallStackFormed),
    ExprEvaluated(EvaluationResult),
    Rte(RuntimeError),
}

/// One entry of the `pingDebugUIParams` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub target_id: Option<DebugTargetId>,
    pub body: NotificationBody,
}

impl Notification {
    pub fn target_started(target: DebugTargetId) -> Self {
        Self {
            kind: NotificationKind::TargetStarted,
            target_id: Some(target),
            body: NotificationBody::None,
        }
    }

    pub fn target_quit(target: DebugTargetId) -> Self {
        Self {
            kind: NotificationKind::TargetQuit,
            target_id: Some(target),
            body: NotificationBody::None,
        }
    }

    pub fn call_stack_formed(info: CallStackFormed) -> Self {
        Self {
            kind: NotificationKind::CallStackFormed,
            target_id: None,
            body: NotificationBody::CallStackFormed(info),
        }
    }

    pub fn expr_evaluated(result: EvaluationResult) -> Self {
        Self {
            kind: NotificationKind::ExprEvaluated,
            target_id: None,
            body: NotificationBody::ExprEvaluated(result),
        }
    }

    pub fn rte(info: RuntimeError) -> Self {
        Self {
            kind: NotificationKind::RteProcessing,
            target_id: None,
            body: NotificationBody::Rte(info),
        }
    }
}
