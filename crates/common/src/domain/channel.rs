use crate::domain::{IngestError, IngestResult};
use std::fmt;

/// Closed set of telemetry categories the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    CameraRecognition,
    AccessControl,
    BuildingMetric,
    AirQuality,
    Wearable,
    NetworkLog,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::CameraRecognition => "camera-recognition",
            ChannelKind::AccessControl => "access-control",
            ChannelKind::BuildingMetric => "building-metric",
            ChannelKind::AirQuality => "air-quality",
            ChannelKind::Wearable => "wearable",
            ChannelKind::NetworkLog => "network-log",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broker subject and everything derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub subject: &'static str,
    pub kind: ChannelKind,
    pub stream: &'static str,
    pub durable_name: &'static str,
    pub raw_prefix: &'static str,
    pub collection: &'static str,
}

pub static CHANNELS: [Channel; 10] = [
    Channel {
        subject: "fr.camera",
        kind: ChannelKind::CameraRecognition,
        stream: "FR",
        durable_name: "proc_fr_camera",
        raw_prefix: "camera-recognition",
        collection: "camera_recognition",
    },
    Channel {
        subject: "fr.fas",
        kind: ChannelKind::AccessControl,
        stream: "FR",
        durable_name: "proc_fr_fas",
        raw_prefix: "access-control",
        collection: "access_control",
    },
    Channel {
        subject: "bms.ac",
        kind: ChannelKind::BuildingMetric,
        stream: "BMS",
        durable_name: "proc_bms_ac",
        raw_prefix: "building-metric/ac",
        collection: "building_metric",
    },
    Channel {
        subject: "bms.mv",
        kind: ChannelKind::BuildingMetric,
        stream: "BMS",
        durable_name: "proc_bms_mv",
        raw_prefix: "building-metric/mv",
        collection: "building_metric",
    },
    Channel {
        subject: "bms.pm",
        kind: ChannelKind::BuildingMetric,
        stream: "BMS",
        durable_name: "proc_bms_pm",
        raw_prefix: "building-metric/pm",
        collection: "building_metric",
    },
    Channel {
        subject: "bms.light",
        kind: ChannelKind::BuildingMetric,
        stream: "BMS",
        durable_name: "proc_bms_light",
        raw_prefix: "building-metric/light",
        collection: "building_metric",
    },
    Channel {
        subject: "bms.water",
        kind: ChannelKind::BuildingMetric,
        stream: "BMS",
        durable_name: "proc_bms_water",
        raw_prefix: "building-metric/water",
        collection: "building_metric",
    },
    Channel {
        subject: "iaq",
        kind: ChannelKind::AirQuality,
        stream: "CLOUD",
        durable_name: "proc_iaq",
        raw_prefix: "air-quality",
        collection: "air_quality",
    },
    Channel {
        subject: "oura",
        kind: ChannelKind::Wearable,
        stream: "CLOUD",
        durable_name: "proc_oura",
        raw_prefix: "wearable",
        collection: "wearable",
    },
    Channel {
        subject: "netlog",
        kind: ChannelKind::NetworkLog,
        stream: "CLOUD",
        durable_name: "proc_netlog",
        raw_prefix: "network-log",
        collection: "network_log",
    },
];

impl Channel {
    /// Resolve a broker subject. Subjects outside the table are `UnknownKind`, never auto-mapped.
    pub fn from_subject(subject: &str) -> IngestResult<&'static Channel> {
        CHANNELS
            .iter()
            .find(|channel| channel.subject == subject)
            .ok_or_else(|| IngestError::UnknownKind(subject.to_string()))
    }

    /// Distinct metadata collections, in table order.
    pub fn collections() -> Vec<&'static str> {
        let mut collections: Vec<&'static str> = Vec::new();
        for channel in &CHANNELS {
            if !collections.contains(&channel.collection) {
                collections.push(channel.collection);
            }
        }
        collections
    }
}

/// JetStream stream carrying a group of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDefinition {
    pub name: &'static str,
    pub subjects: &'static [&'static str],
    pub description: &'static str,
}

pub static STREAMS: [StreamDefinition; 3] = [
    StreamDefinition {
        name: "FR",
        subjects: &["fr.*"],
        description: "Facial recognition and access control events",
    },
    StreamDefinition {
        name: "BMS",
        subjects: &["bms.*"],
        description: "Building management system metrics",
    },
    StreamDefinition {
        name: "CLOUD",
        subjects: &["iaq", "oura", "netlog"],
        description: "Cloud-relayed air quality, wearable and network telemetry",
    },
];
