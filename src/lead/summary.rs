//! Flat per-contact records for export, and their on-disk form.

use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::linalg::apply_affine;
use crate::Vector3;

use super::{ElectrodeContact, Localizer, SubjectResources};

/// Label of one atlas in a [`ContactSummary`].
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct AtlasLabelRecord {
    pub atlas: String,
    /// `None` when no label was found.
    pub label: Option<String>,
    pub index: Option<i32>,
}

/// Everything an export layer needs about one contact.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ContactSummary {
    /// Contact position in tkrRAS.
    pub coord: [f64; 3],
    pub labels: Vec<AtlasLabelRecord>,
    pub hemisphere: String,
    pub surface_electrode: bool,
    pub sphere: Option<[f64; 3]>,
    pub distance_shifted: f64,
    pub distance_to_pial: f64,
    pub mni305: Option<[f64; 3]>,
    pub t1: Option<[f64; 3]>,
}

fn xyz(v: &Vector3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn push_xyz(out: &mut Vec<(String, String)>, prefix: &str, v: Option<[f64; 3]>) {
    for (axis, i) in ["x", "y", "z"].iter().zip(0..3) {
        let value = v.map_or_else(|| "NA".to_string(), |v| v[i].to_string());
        out.push((format!("{prefix}_{axis}"), value));
    }
}

impl ContactSummary {
    /// Column name / value pairs in export order. Missing values are `"NA"`,
    /// missing labels `"Unknown"`.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        push_xyz(&mut out, "Coord", Some(self.coord));
        for record in &self.labels {
            out.push((
                format!("FSLabel_{}", record.atlas),
                record.label.clone().unwrap_or_else(|| "Unknown".to_string()),
            ));
            out.push((
                format!("FSIndex_{}", record.atlas),
                record.index.map_or_else(|| "NA".to_string(), |i| i.to_string()),
            ));
        }
        out.push(("Hemisphere".to_string(), self.hemisphere.clone()));
        out.push((
            "SurfaceElectrode".to_string(),
            self.surface_electrode.to_string(),
        ));
        push_xyz(&mut out, "Sphere", self.sphere);
        out.push((
            "DistanceShifted".to_string(),
            self.distance_shifted.to_string(),
        ));
        out.push((
            "DistanceToPial".to_string(),
            self.distance_to_pial.to_string(),
        ));
        push_xyz(&mut out, "MNI305", self.mni305);
        push_xyz(&mut out, "T1", self.t1);
        out
    }
}

/// The contacts of one subject, as saved to disk.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ContactSheet {
    pub subject: String,
    pub contacts: Vec<ContactSummary>,
}

impl ContactSheet {
    /// Serialize the sheet to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> Vec<u8> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .expect("rkyv serialization failed")
            .to_vec()
    }

    /// Save the sheet to a file using rkyv.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let bytes = self.to_rkyv_bytes();
        std::fs::write(path, &bytes)?;
        info!(
            "Saved {} contacts of {} to {} ({} bytes)",
            self.contacts.len(),
            self.subject,
            path,
            bytes.len()
        );
        Ok(())
    }

    /// Load a sheet from an rkyv file.
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        let sheet = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        info!(
            "Loaded {} contacts of {} from {}",
            sheet.contacts.len(),
            sheet.subject,
            path
        );
        Ok(sheet)
    }
}

impl<'a, R: SubjectResources + ?Sized> Localizer<'a, R> {
    /// Flatten a contact for export.
    ///
    /// `T1` and `MNI305` are only filled in when the host supplies the
    /// tkrRAS → scanner (and scanner → MNI305) affines.
    pub fn summary(&self, contact: &ElectrodeContact) -> ContactSummary {
        let labels = self
            .config
            .atlases
            .iter()
            .map(|spec| {
                let label = contact.label(&spec.name);
                AtlasLabelRecord {
                    atlas: spec.name.clone(),
                    label: label.map(|l| l.label.clone()),
                    index: label.map(|l| l.index),
                }
            })
            .collect();

        let t1 = self
            .resources
            .tkr_to_scanner(&self.subject)
            .map(|m| apply_affine(&m, &contact.position));
        let mni305 = t1.and_then(|p| {
            self.resources
                .scanner_to_mni305(&self.subject)
                .map(|m| apply_affine(&m, &p))
        });

        ContactSummary {
            coord: xyz(&contact.position),
            labels,
            hemisphere: contact.hemisphere.as_str().to_string(),
            surface_electrode: contact.is_surface(),
            sphere: contact.sphere_position.as_ref().map(xyz),
            distance_shifted: contact.distance_to_shifted,
            distance_to_pial: contact.distance_from_shifted_to_pial,
            mni305: mni305.as_ref().map(xyz),
            t1: t1.as_ref().map(xyz),
        }
    }

    /// Summaries of `contacts`, skipping disabled ones.
    pub fn sheet(&self, contacts: &[ElectrodeContact]) -> ContactSheet {
        ContactSheet {
            subject: self.subject.clone(),
            contacts: contacts
                .iter()
                .filter(|c| c.enabled)
                .map(|c| self.summary(c))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::LookupTable;
    use crate::lead::{AtlasSource, InMemoryResources, LocalizationConfig};
    use crate::volume::Volume;
    use crate::Matrix4;

    fn resources() -> InMemoryResources {
        let n = 8;
        let mut data = vec![0.0f32; n * n * n];
        data[3 + n * (3 + n * 3)] = 17.0;
        let aseg = Volume::new(data, [n; 3], Matrix4::identity()).unwrap();
        let mut tkr_to_scanner = Matrix4::identity();
        tkr_to_scanner[(0, 3)] = 10.0;
        let mut to_mni = Matrix4::identity();
        to_mni[(1, 1)] = 2.0;

        let mut r = InMemoryResources::new();
        r.insert_atlas(
            "s1",
            "aseg",
            aseg,
            LookupTable::from_entries([(2, "Left-Cerebral-White-Matter"), (17, "Left-Hippocampus")]),
        )
        .set_tkr_to_scanner("s1", tkr_to_scanner)
        .set_scanner_to_mni305("s1", to_mni);
        r
    }

    fn config() -> LocalizationConfig {
        LocalizationConfig {
            atlases: vec![AtlasSource::new("aseg", None), AtlasSource::new("aparc+aseg", None)],
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_fields() {
        let r = resources();
        let loc = Localizer::new(&r, "s1", config());
        let c = loc.localize(Vector3::new(3.0, 3.0, 3.0));
        let s = loc.summary(&c);

        assert_eq!(s.coord, [3.0, 3.0, 3.0]);
        assert_eq!(s.t1, Some([13.0, 3.0, 3.0]));
        assert_eq!(s.mni305, Some([13.0, 6.0, 3.0]));
        assert_eq!(s.hemisphere, "right");
        assert!(s.sphere.is_none());

        let fields = s.fields();
        let get = |k: &str| {
            fields
                .iter()
                .find(|(name, _)| name == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("FSLabel_aseg"), Some("Left-Hippocampus"));
        assert_eq!(get("FSIndex_aseg"), Some("17"));
        assert_eq!(get("FSLabel_aparc+aseg"), Some("Unknown"));
        assert_eq!(get("FSIndex_aparc+aseg"), Some("NA"));
        assert_eq!(get("Sphere_x"), Some("NA"));
        assert_eq!(get("T1_x"), Some("13"));
        assert_eq!(get("SurfaceElectrode"), Some("false"));
        assert_eq!(fields[0].0, "Coord_x");
        assert_eq!(fields.last().map(|f| f.0.as_str()), Some("T1_z"));
    }

    #[test]
    fn test_no_transforms_gives_na() {
        let r = InMemoryResources::new();
        let loc = Localizer::new(&r, "s1", config());
        let s = loc.summary(&loc.localize(Vector3::new(-1.0, 0.0, 0.0)));
        assert!(s.t1.is_none());
        assert!(s.mni305.is_none());
        assert_eq!(s.hemisphere, "left");
    }

    #[test]
    fn test_sheet_skips_disabled() {
        let r = resources();
        let loc = Localizer::new(&r, "s1", config());
        let mut contacts = vec![
            loc.localize(Vector3::new(1.0, 1.0, 1.0)),
            loc.localize(Vector3::new(2.0, 2.0, 2.0)),
        ];
        contacts[0].enabled = false;
        let sheet = loc.sheet(&contacts);
        assert_eq!(sheet.subject, "s1");
        assert_eq!(sheet.contacts.len(), 1);
        assert_eq!(sheet.contacts[0].coord, [2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_rkyv_bytes_roundtrip() {
        let r = resources();
        let loc = Localizer::new(&r, "s1", config());
        let sheet = loc.sheet(&[loc.localize(Vector3::new(3.0, 3.0, 3.0))]);
        let bytes = sheet.to_rkyv_bytes();
        let back = rkyv::from_bytes::<ContactSheet, rkyv::rancor::Error>(&bytes).unwrap();
        assert_eq!(back, sheet);
    }
}
