//! Known detail extensions.
//!
//! Dispatch is an explicit table from element name to [`ExtensionKind`]. Each
//! kind has a [`DecodeStrategy`]: typed kinds have their attributes parsed
//! into a struct, raw kinds are kept verbatim, and schema-checked kinds are
//! kept verbatim after a [`SchemaValidator`](super::SchemaValidator) accepts
//! them.

use super::{RawXml, Typed};
use cotguard_core::{EncodeError, ExtensionError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How an extension's element is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Attributes parsed into a typed value; the span is kept until modified
    Typed,
    /// Kept verbatim
    Raw,
    /// Kept verbatim after the named schema accepts it
    SchemaChecked(&'static str),
}

/// Every recognized `<detail>` sub-element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtensionKind {
    Contact,
    Group,
    Track,
    Status,
    Takv,
    PrecisionLocation,
    Uid,
    UserIcon,
    Color,
    Remarks,
    Emergency,
    Height,
    Shape,
    Geofence,
    Mission,
    Environment,
    FileShare,
    ServerDestination,
    Video,
    Archive,
    AttachmentList,
    StrokeColor,
    StrokeWeight,
    FillColor,
    LabelsOn,
    Bullseye,
    RouteInfo,
    Hierarchy,
    Marti,
    HeightUnit,
    Sensor,
    LinkAttr,
    Chat,
    ChatReceipt,
    ChatReceiptLegacy,
}

static BY_NAME: Lazy<HashMap<&'static str, ExtensionKind>> = Lazy::new(|| {
    ExtensionKind::ALL
        .iter()
        .map(|kind| (kind.element_name(), *kind))
        .collect()
});

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 35] = [
        ExtensionKind::Contact,
        ExtensionKind::Group,
        ExtensionKind::Track,
        ExtensionKind::Status,
        ExtensionKind::Takv,
        ExtensionKind::PrecisionLocation,
        ExtensionKind::Uid,
        ExtensionKind::UserIcon,
        ExtensionKind::Color,
        ExtensionKind::Remarks,
        ExtensionKind::Emergency,
        ExtensionKind::Height,
        ExtensionKind::Shape,
        ExtensionKind::Geofence,
        ExtensionKind::Mission,
        ExtensionKind::Environment,
        ExtensionKind::FileShare,
        ExtensionKind::ServerDestination,
        ExtensionKind::Video,
        ExtensionKind::Archive,
        ExtensionKind::AttachmentList,
        ExtensionKind::StrokeColor,
        ExtensionKind::StrokeWeight,
        ExtensionKind::FillColor,
        ExtensionKind::LabelsOn,
        ExtensionKind::Bullseye,
        ExtensionKind::RouteInfo,
        ExtensionKind::Hierarchy,
        ExtensionKind::Marti,
        ExtensionKind::HeightUnit,
        ExtensionKind::Sensor,
        ExtensionKind::LinkAttr,
        ExtensionKind::Chat,
        ExtensionKind::ChatReceipt,
        ExtensionKind::ChatReceiptLegacy,
    ];

    /// Looks up the kind for a `<detail>` child element name. Exact match.
    pub fn from_name(name: &str) -> Option<Self> {
        BY_NAME.get(name).copied()
    }

    /// The element name on the wire.
    pub const fn element_name(&self) -> &'static str {
        match self {
            ExtensionKind::Contact => "contact",
            ExtensionKind::Group => "__group",
            ExtensionKind::Track => "track",
            ExtensionKind::Status => "status",
            ExtensionKind::Takv => "takv",
            ExtensionKind::PrecisionLocation => "precisionlocation",
            ExtensionKind::Uid => "uid",
            ExtensionKind::UserIcon => "usericon",
            ExtensionKind::Color => "color",
            ExtensionKind::Remarks => "remarks",
            ExtensionKind::Emergency => "emergency",
            ExtensionKind::Height => "height",
            ExtensionKind::Shape => "shape",
            ExtensionKind::Geofence => "__geofence",
            ExtensionKind::Mission => "mission",
            ExtensionKind::Environment => "environment",
            ExtensionKind::FileShare => "fileshare",
            ExtensionKind::ServerDestination => "__serverdestination",
            ExtensionKind::Video => "__video",
            ExtensionKind::Archive => "archive",
            ExtensionKind::AttachmentList => "attachment_list",
            ExtensionKind::StrokeColor => "strokeColor",
            ExtensionKind::StrokeWeight => "strokeWeight",
            ExtensionKind::FillColor => "fillColor",
            ExtensionKind::LabelsOn => "labels_on",
            ExtensionKind::Bullseye => "bullseye",
            ExtensionKind::RouteInfo => "__routeinfo",
            ExtensionKind::Hierarchy => "hierarchy",
            ExtensionKind::Marti => "marti",
            ExtensionKind::HeightUnit => "height_unit",
            ExtensionKind::Sensor => "sensor",
            ExtensionKind::LinkAttr => "link_attr",
            ExtensionKind::Chat => "__chat",
            ExtensionKind::ChatReceipt => "__chatreceipt",
            ExtensionKind::ChatReceiptLegacy => "__chatReceipt",
        }
    }

    pub const fn strategy(&self) -> DecodeStrategy {
        match self {
            ExtensionKind::Contact
            | ExtensionKind::Group
            | ExtensionKind::Track
            | ExtensionKind::Status
            | ExtensionKind::Takv
            | ExtensionKind::PrecisionLocation
            | ExtensionKind::Uid
            | ExtensionKind::UserIcon
            | ExtensionKind::Color
            | ExtensionKind::Remarks
            | ExtensionKind::Emergency
            | ExtensionKind::Height => DecodeStrategy::Typed,
            ExtensionKind::Chat => DecodeStrategy::SchemaChecked("__chat"),
            ExtensionKind::ChatReceipt => DecodeStrategy::SchemaChecked("__chatreceipt"),
            ExtensionKind::ChatReceiptLegacy => DecodeStrategy::SchemaChecked("__chatReceipt"),
            _ => DecodeStrategy::Raw,
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Attributes of an element being decoded into a typed extension.
///
/// Typed decoders take the attributes they understand; whatever is left is
/// preserved on the [`Typed`] wrapper.
#[derive(Debug)]
pub struct Attributes {
    element: &'static str,
    items: Vec<(String, String)>,
}

impl Attributes {
    pub fn new(element: &'static str, items: Vec<(String, String)>) -> Self {
        Self { element, items }
    }

    /// Removes and returns the first attribute called `name`.
    pub fn take(&mut self, name: &str) -> Option<String> {
        let at = self.items.iter().position(|(k, _)| k == name)?;
        Some(self.items.remove(at).1)
    }

    pub fn take_or_default(&mut self, name: &str) -> String {
        self.take(name).unwrap_or_default()
    }

    pub fn parse<T: FromStr>(&mut self, name: &str) -> Result<Option<T>, ExtensionError>
    where
        T::Err: fmt::Display,
    {
        match self.take(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ExtensionError::attribute(self.element, name, e.to_string())),
        }
    }

    pub fn require<T: FromStr>(&mut self, name: &str) -> Result<T, ExtensionError>
    where
        T::Err: fmt::Display,
    {
        self.parse(name)?
            .ok_or_else(|| ExtensionError::missing(self.element, name))
    }

    /// Attributes no decoder took, in document order.
    pub fn into_remaining(self) -> Vec<(String, String)> {
        self.items
    }
}

/// A detail extension with a typed representation.
pub trait TypedExtension: Sized + Clone + PartialEq {
    const KIND: ExtensionKind;

    /// Builds the value from the element's attributes and character data.
    fn decode(attributes: &mut Attributes, text: &str) -> Result<Self, ExtensionError>;

    /// Attributes in canonical order. Optional fields that are unset are
    /// omitted.
    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError>;

    /// Character data, for extensions that carry any.
    fn text(&self) -> Option<&str> {
        None
    }

    /// Checks value invariants.
    fn check(&self) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn wrap(typed: Typed<Self>) -> Extension;

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>>;

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>>;
}

pub(crate) fn format_f64(field: &str, value: f64) -> Result<String, EncodeError> {
    if value.is_finite() {
        Ok(value.to_string())
    } else {
        Err(EncodeError::NonFinite {
            field: field.to_string(),
        })
    }
}

/// Contact information. A contact may carry only an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Contact {
    /// Callsign for display
    pub callsign: String,
    /// Optional endpoint for communication
    pub endpoint: Option<String>,
    pub phone: Option<String>,
}

impl Contact {
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Group information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Group {
    /// Group name (team color)
    pub name: String,
    /// Group role
    pub role: String,
}

impl Group {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

/// Track information for moving entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Speed in meters per second
    pub speed: f64,
    /// Course/heading in degrees (0-360)
    pub course: f64,
}

/// Status information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    /// Battery level (0-100)
    pub battery: Option<u32>,
    pub readiness: Option<bool>,
}

/// TAK version and device information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Takv {
    /// Device identifier
    pub device: String,
    /// Platform (e.g., "ATAK", "WinTAK", "iTAK")
    pub platform: String,
    /// Operating system
    pub os: String,
    /// Version string
    pub version: String,
}

/// Precision location source information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrecisionLocation {
    /// Geopoint source (e.g., "GPS", "USER")
    pub geopointsrc: String,
    /// Altitude source (e.g., "GPS", "DTED")
    pub altsrc: String,
}

/// `<uid Droid="..."/>`: the display name a device announces for itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UidAlias {
    pub droid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserIcon {
    pub iconset_path: String,
}

/// Marker color in signed ARGB (e.g., -65536 for red)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub argb: i32,
}

/// Free text remarks
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Remarks {
    pub text: String,
    pub source: Option<String>,
    pub to: Option<String>,
}

impl Remarks {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Emergency beacon
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Emergency {
    /// Alert kind, e.g. "911 Alert"
    pub kind: Option<String>,
    pub cancel: bool,
    pub text: String,
}

/// Height of the object in meters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Height {
    pub value: f64,
}

impl TypedExtension for Contact {
    const KIND: ExtensionKind = ExtensionKind::Contact;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            callsign: attributes.take_or_default("callsign"),
            endpoint: attributes.take("endpoint"),
            phone: attributes.take("phone"),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        let mut attrs = Vec::new();
        push_non_empty(&mut attrs, "callsign", &self.callsign);
        if let Some(endpoint) = &self.endpoint {
            attrs.push(("endpoint", endpoint.clone()));
        }
        if let Some(phone) = &self.phone {
            attrs.push(("phone", phone.clone()));
        }
        Ok(attrs)
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Contact(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Contact(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Contact(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for Group {
    const KIND: ExtensionKind = ExtensionKind::Group;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            name: attributes.take_or_default("name"),
            role: attributes.take_or_default("role"),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        Ok(vec![("name", self.name.clone()), ("role", self.role.clone())])
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Group(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Group(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Group(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for Track {
    const KIND: ExtensionKind = ExtensionKind::Track;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            speed: attributes.require("speed")?,
            course: attributes.require("course")?,
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        Ok(vec![
            ("speed", format_f64("track.speed", self.speed)?),
            ("course", format_f64("track.course", self.course)?),
        ])
    }

    fn check(&self) -> Result<(), ExtensionError> {
        if !(self.speed >= 0.0) || !self.speed.is_finite() {
            return Err(ExtensionError::invalid(
                "track",
                format!("speed {} must be a non-negative number", self.speed),
            ));
        }
        if !(0.0..=360.0).contains(&self.course) {
            return Err(ExtensionError::invalid(
                "track",
                format!("course {} must be between 0 and 360", self.course),
            ));
        }
        Ok(())
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Track(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Track(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Track(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for Status {
    const KIND: ExtensionKind = ExtensionKind::Status;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            battery: attributes.parse("battery")?,
            readiness: attributes.parse("readiness")?,
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        let mut attrs = Vec::new();
        if let Some(battery) = self.battery {
            attrs.push(("battery", battery.to_string()));
        }
        if let Some(readiness) = self.readiness {
            attrs.push(("readiness", readiness.to_string()));
        }
        Ok(attrs)
    }

    fn check(&self) -> Result<(), ExtensionError> {
        match self.battery {
            Some(battery) if battery > 100 => Err(ExtensionError::invalid(
                "status",
                format!("battery {battery} exceeds 100"),
            )),
            _ => Ok(()),
        }
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Status(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Status(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Status(t) => Some(t),
            _ => None,
        }
    }
}

fn push_non_empty(attrs: &mut Vec<(&'static str, String)>, name: &'static str, value: &str) {
    if !value.is_empty() {
        attrs.push((name, value.to_string()));
    }
}

impl TypedExtension for Takv {
    const KIND: ExtensionKind = ExtensionKind::Takv;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            device: attributes.take_or_default("device"),
            platform: attributes.take_or_default("platform"),
            os: attributes.take_or_default("os"),
            version: attributes.take_or_default("version"),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        let mut attrs = Vec::new();
        push_non_empty(&mut attrs, "device", &self.device);
        push_non_empty(&mut attrs, "platform", &self.platform);
        push_non_empty(&mut attrs, "os", &self.os);
        push_non_empty(&mut attrs, "version", &self.version);
        Ok(attrs)
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Takv(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Takv(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Takv(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for PrecisionLocation {
    const KIND: ExtensionKind = ExtensionKind::PrecisionLocation;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            geopointsrc: attributes.take_or_default("geopointsrc"),
            altsrc: attributes.take_or_default("altsrc"),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        let mut attrs = Vec::new();
        push_non_empty(&mut attrs, "geopointsrc", &self.geopointsrc);
        push_non_empty(&mut attrs, "altsrc", &self.altsrc);
        Ok(attrs)
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::PrecisionLocation(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::PrecisionLocation(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::PrecisionLocation(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for UidAlias {
    const KIND: ExtensionKind = ExtensionKind::Uid;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            droid: attributes.take_or_default("Droid"),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        Ok(vec![("Droid", self.droid.clone())])
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Uid(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Uid(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Uid(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for UserIcon {
    const KIND: ExtensionKind = ExtensionKind::UserIcon;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            iconset_path: attributes.take_or_default("iconsetpath"),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        Ok(vec![("iconsetpath", self.iconset_path.clone())])
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::UserIcon(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::UserIcon(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::UserIcon(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for Color {
    const KIND: ExtensionKind = ExtensionKind::Color;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            argb: attributes.require("argb")?,
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        Ok(vec![("argb", self.argb.to_string())])
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Color(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Color(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Color(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for Remarks {
    const KIND: ExtensionKind = ExtensionKind::Remarks;

    fn decode(attributes: &mut Attributes, text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            text: text.to_string(),
            source: attributes.take("source"),
            to: attributes.take("to"),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        let mut attrs = Vec::new();
        if let Some(source) = &self.source {
            attrs.push(("source", source.clone()));
        }
        if let Some(to) = &self.to {
            attrs.push(("to", to.clone()));
        }
        Ok(attrs)
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Remarks(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Remarks(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Remarks(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for Emergency {
    const KIND: ExtensionKind = ExtensionKind::Emergency;

    fn decode(attributes: &mut Attributes, text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            kind: attributes.take("type"),
            cancel: attributes.parse("cancel")?.unwrap_or(false),
            text: text.to_string(),
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        let mut attrs = Vec::new();
        if let Some(kind) = &self.kind {
            attrs.push(("type", kind.clone()));
        }
        if self.cancel {
            attrs.push(("cancel", "true".to_string()));
        }
        Ok(attrs)
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Emergency(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Emergency(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Emergency(t) => Some(t),
            _ => None,
        }
    }
}

impl TypedExtension for Height {
    const KIND: ExtensionKind = ExtensionKind::Height;

    fn decode(attributes: &mut Attributes, _text: &str) -> Result<Self, ExtensionError> {
        Ok(Self {
            value: attributes.require("value")?,
        })
    }

    fn attributes(&self) -> Result<Vec<(&'static str, String)>, EncodeError> {
        Ok(vec![("value", format_f64("height.value", self.value)?)])
    }

    fn check(&self) -> Result<(), ExtensionError> {
        if !self.value.is_finite() {
            return Err(ExtensionError::invalid("height", "value is not finite"));
        }
        Ok(())
    }

    fn wrap(typed: Typed<Self>) -> Extension {
        Extension::Height(typed)
    }

    fn unwrap_ref(extension: &Extension) -> Option<&Typed<Self>> {
        match extension {
            Extension::Height(t) => Some(t),
            _ => None,
        }
    }

    fn unwrap_mut(extension: &mut Extension) -> Option<&mut Typed<Self>> {
        match extension {
            Extension::Height(t) => Some(t),
            _ => None,
        }
    }
}

/// A recognized detail extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Extension {
    Contact(Typed<Contact>),
    Group(Typed<Group>),
    Track(Typed<Track>),
    Status(Typed<Status>),
    Takv(Typed<Takv>),
    PrecisionLocation(Typed<PrecisionLocation>),
    Uid(Typed<UidAlias>),
    UserIcon(Typed<UserIcon>),
    Color(Typed<Color>),
    Remarks(Typed<Remarks>),
    Emergency(Typed<Emergency>),
    Height(Typed<Height>),
    /// A raw or schema-checked kind, kept verbatim
    Raw(ExtensionKind, RawXml),
}

impl Extension {
    /// Wraps a typed value with no retained span.
    pub fn typed<T: TypedExtension>(value: T) -> Self {
        T::wrap(Typed::new(value))
    }

    pub fn kind(&self) -> ExtensionKind {
        match self {
            Extension::Contact(_) => ExtensionKind::Contact,
            Extension::Group(_) => ExtensionKind::Group,
            Extension::Track(_) => ExtensionKind::Track,
            Extension::Status(_) => ExtensionKind::Status,
            Extension::Takv(_) => ExtensionKind::Takv,
            Extension::PrecisionLocation(_) => ExtensionKind::PrecisionLocation,
            Extension::Uid(_) => ExtensionKind::Uid,
            Extension::UserIcon(_) => ExtensionKind::UserIcon,
            Extension::Color(_) => ExtensionKind::Color,
            Extension::Remarks(_) => ExtensionKind::Remarks,
            Extension::Emergency(_) => ExtensionKind::Emergency,
            Extension::Height(_) => ExtensionKind::Height,
            Extension::Raw(kind, _) => *kind,
        }
    }

    /// Verbatim bytes this extension will be written as, if any.
    pub fn raw(&self) -> Option<&RawXml> {
        match self {
            Extension::Contact(t) => t.raw(),
            Extension::Group(t) => t.raw(),
            Extension::Track(t) => t.raw(),
            Extension::Status(t) => t.raw(),
            Extension::Takv(t) => t.raw(),
            Extension::PrecisionLocation(t) => t.raw(),
            Extension::Uid(t) => t.raw(),
            Extension::UserIcon(t) => t.raw(),
            Extension::Color(t) => t.raw(),
            Extension::Remarks(t) => t.raw(),
            Extension::Emergency(t) => t.raw(),
            Extension::Height(t) => t.raw(),
            Extension::Raw(_, xml) => Some(xml),
        }
    }

    /// Checks typed invariants. Raw extensions have none here; schema-checked
    /// ones are re-checked by the validator.
    pub fn check(&self) -> Result<(), ExtensionError> {
        match self {
            Extension::Contact(t) => t.check(),
            Extension::Group(t) => t.check(),
            Extension::Track(t) => t.check(),
            Extension::Status(t) => t.check(),
            Extension::Takv(t) => t.check(),
            Extension::PrecisionLocation(t) => t.check(),
            Extension::Uid(t) => t.check(),
            Extension::UserIcon(t) => t.check(),
            Extension::Color(t) => t.check(),
            Extension::Remarks(t) => t.check(),
            Extension::Emergency(t) => t.check(),
            Extension::Height(t) => t.check(),
            Extension::Raw(..) => Ok(()),
        }
    }

    /// Decodes a typed kind from a captured element.
    pub(crate) fn decode_typed(
        kind: ExtensionKind,
        attributes: Vec<(String, String)>,
        text: &str,
        children: Vec<RawXml>,
        raw: RawXml,
    ) -> Result<Self, ExtensionError> {
        let attrs = Attributes::new(kind.element_name(), attributes);
        let parts = (children, raw);
        match kind {
            ExtensionKind::Contact => decode_into::<Contact>(attrs, text, parts),
            ExtensionKind::Group => decode_into::<Group>(attrs, text, parts),
            ExtensionKind::Track => decode_into::<Track>(attrs, text, parts),
            ExtensionKind::Status => decode_into::<Status>(attrs, text, parts),
            ExtensionKind::Takv => decode_into::<Takv>(attrs, text, parts),
            ExtensionKind::PrecisionLocation => decode_into::<PrecisionLocation>(attrs, text, parts),
            ExtensionKind::Uid => decode_into::<UidAlias>(attrs, text, parts),
            ExtensionKind::UserIcon => decode_into::<UserIcon>(attrs, text, parts),
            ExtensionKind::Color => decode_into::<Color>(attrs, text, parts),
            ExtensionKind::Remarks => decode_into::<Remarks>(attrs, text, parts),
            ExtensionKind::Emergency => decode_into::<Emergency>(attrs, text, parts),
            ExtensionKind::Height => decode_into::<Height>(attrs, text, parts),
            other => Ok(Extension::Raw(other, parts.1)),
        }
    }
}

fn decode_into<T: TypedExtension>(
    mut attributes: Attributes,
    text: &str,
    (children, raw): (Vec<RawXml>, RawXml),
) -> Result<Extension, ExtensionError> {
    let value = T::decode(&mut attributes, text)?;
    Ok(T::wrap(Typed::decoded(
        value,
        attributes.into_remaining(),
        children,
        raw,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table_covers_every_kind() {
        for kind in ExtensionKind::ALL {
            assert_eq!(ExtensionKind::from_name(kind.element_name()), Some(kind));
        }
        assert_eq!(ExtensionKind::from_name("Contact"), None);
        assert_eq!(ExtensionKind::from_name("link"), None);
    }

    #[test]
    fn test_strategies() {
        assert_eq!(ExtensionKind::Contact.strategy(), DecodeStrategy::Typed);
        assert_eq!(ExtensionKind::Shape.strategy(), DecodeStrategy::Raw);
        assert_eq!(
            ExtensionKind::Chat.strategy(),
            DecodeStrategy::SchemaChecked("__chat")
        );
        assert_eq!(
            ExtensionKind::ChatReceiptLegacy.strategy(),
            DecodeStrategy::SchemaChecked("__chatReceipt")
        );
    }

    #[test]
    fn test_typed_decode_keeps_unknown_attributes() {
        let raw = RawXml::new(r#"<contact callsign="ALPHA" endpoint="*:-1:stcp" xmppUsername="a"/>"#);
        let ext = Extension::decode_typed(
            ExtensionKind::Contact,
            vec![
                ("callsign".into(), "ALPHA".into()),
                ("endpoint".into(), "*:-1:stcp".into()),
                ("xmppUsername".into(), "a".into()),
            ],
            "",
            Vec::new(),
            raw.clone(),
        )
        .unwrap();

        let typed = Contact::unwrap_ref(&ext).unwrap();
        assert_eq!(typed.callsign, "ALPHA");
        assert_eq!(typed.extra_attributes(), &[("xmppUsername".to_string(), "a".to_string())]);
        assert_eq!(ext.raw(), Some(&raw));
    }

    #[test]
    fn test_typed_decode_rejects_bad_numbers() {
        let err = Extension::decode_typed(
            ExtensionKind::Track,
            vec![("speed".into(), "fast".into()), ("course".into(), "1".into())],
            "",
            Vec::new(),
            RawXml::new("<track/>"),
        )
        .unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidAttribute { .. }));

        let err = Extension::decode_typed(
            ExtensionKind::Color,
            Vec::new(),
            "",
            Vec::new(),
            RawXml::new("<color/>"),
        )
        .unwrap_err();
        assert_eq!(err, ExtensionError::missing("color", "argb"));
    }

    #[test]
    fn test_invariants() {
        let track = Track {
            speed: -1.0,
            course: 10.0,
        };
        assert!(track.check().is_err());
        let track = Track {
            speed: 1.0,
            course: 361.0,
        };
        assert!(track.check().is_err());
        let status = Status {
            battery: Some(101),
            readiness: None,
        };
        assert!(status.check().is_err());
        assert!(Contact::new("").check().is_ok());
        assert!(Contact::default().with_endpoint("10.0.0.1:4242:tcp").check().is_ok());
    }

    #[test]
    fn test_non_finite_values_refuse_to_encode() {
        let track = Track {
            speed: f64::NAN,
            course: 0.0,
        };
        assert!(matches!(
            track.attributes(),
            Err(EncodeError::NonFinite { .. })
        ));
    }
}
