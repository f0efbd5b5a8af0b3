use crate::{CodecError, Result, SchemaDescriptor, SchemaId};
use std::collections::HashMap;
use std::path::Path;

const EMBEDDED: [(SchemaId, &str); 7] = [
    (
        SchemaId::CameraRecognition,
        include_str!("../schemas/camera_recognition.avsc"),
    ),
    (
        SchemaId::AccessControl,
        include_str!("../schemas/access_control.avsc"),
    ),
    (
        SchemaId::BuildingMetric,
        include_str!("../schemas/building_metric.avsc"),
    ),
    (
        SchemaId::AirQuality,
        include_str!("../schemas/air_quality.avsc"),
    ),
    (
        SchemaId::WearableV1,
        include_str!("../schemas/wearable_v1.avsc"),
    ),
    (
        SchemaId::WearableV2,
        include_str!("../schemas/wearable_v2.avsc"),
    ),
    (
        SchemaId::NetworkLog,
        include_str!("../schemas/network_log.avsc"),
    ),
];

/// Read-only table of descriptors, loaded once at startup and shared across consumers.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    descriptors: HashMap<SchemaId, SchemaDescriptor>,
}

impl SchemaRegistry {
    /// Load the descriptors compiled into this crate.
    pub fn embedded() -> Result<Self> {
        let descriptors = EMBEDDED
            .iter()
            .map(|(id, source)| SchemaDescriptor::parse(*id, source).map(|d| (*id, d)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self { descriptors })
    }

    /// Load every descriptor from `dir`, by [`SchemaId::file_name`]. A missing file is an error.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut descriptors = HashMap::with_capacity(SchemaId::ALL.len());

        for id in SchemaId::ALL {
            let path = dir.join(id.file_name());
            let source = std::fs::read_to_string(&path).map_err(|source| CodecError::Io {
                path: path.display().to_string(),
                source,
            })?;
            descriptors.insert(id, SchemaDescriptor::parse(id, &source)?);
        }

        Ok(Self { descriptors })
    }

    pub fn describe(&self, id: SchemaId) -> Result<&SchemaDescriptor> {
        self.descriptors
            .get(&id)
            .ok_or(CodecError::UnknownSchema(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldType;

    #[test]
    fn test_embedded_registry_describes_every_schema() {
        let registry = SchemaRegistry::embedded().unwrap();

        for id in SchemaId::ALL {
            let descriptor = registry.describe(id).unwrap();
            assert_eq!(descriptor.id(), id);
            assert_eq!(descriptor.fields()[1].name, "ts");
            assert_eq!(descriptor.fields()[1].field_type, FieldType::Long);
        }
    }

    #[test]
    fn test_wearable_v2_extends_v1() {
        let registry = SchemaRegistry::embedded().unwrap();
        let v1 = registry.describe(SchemaId::WearableV1).unwrap();
        let v2 = registry.describe(SchemaId::WearableV2).unwrap();

        assert_eq!(&v2.fields()[..v1.fields().len()], v1.fields());

        let extra: Vec<_> = v2.fields()[v1.fields().len()..]
            .iter()
            .map(|f| (f.name.as_str(), f.nullable))
            .collect();
        assert_eq!(extra, vec![("hrv_ms", true), ("skin_temp_c", true)]);
    }

    #[test]
    fn test_pii_fields_are_marked() {
        let registry = SchemaRegistry::embedded().unwrap();

        for id in [
            SchemaId::CameraRecognition,
            SchemaId::AccessControl,
            SchemaId::WearableV1,
            SchemaId::WearableV2,
        ] {
            let pii: Vec<_> = registry.describe(id).unwrap().pii_sources().collect();
            assert_eq!(pii, vec!["email"], "schema {id}");
        }

        for id in [
            SchemaId::BuildingMetric,
            SchemaId::AirQuality,
            SchemaId::NetworkLog,
        ] {
            assert_eq!(registry.describe(id).unwrap().pii_sources().count(), 0);
        }
    }

    #[test]
    fn test_counter_fields_are_32_bit() {
        let registry = SchemaRegistry::embedded().unwrap();

        let network_log = registry.describe(SchemaId::NetworkLog).unwrap();
        for name in ["bytes_in", "bytes_out"] {
            assert_eq!(network_log.field(name).unwrap().field_type, FieldType::Int, "{name}");
        }
        assert_eq!(network_log.field("ts").unwrap().field_type, FieldType::Long);
    }

    #[test]
    fn test_from_dir_missing_file_fails() {
        let dir = std::env::temp_dir().join("telemetry_codec_missing_schemas");
        let _ = std::fs::create_dir_all(&dir);

        let result = SchemaRegistry::from_dir(&dir);
        assert!(matches!(result, Err(CodecError::Io { .. })));
    }

    #[test]
    fn test_from_dir_loads_overrides() {
        let dir = std::env::temp_dir().join(format!(
            "telemetry_codec_schemas_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        for (id, source) in EMBEDDED {
            std::fs::write(dir.join(id.file_name()), source).unwrap();
        }

        let registry = SchemaRegistry::from_dir(&dir).unwrap();
        assert_eq!(
            registry
                .describe(SchemaId::BuildingMetric)
                .unwrap()
                .fields()
                .len(),
            4
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
