//! Volume rewriting before compilation

use kale_notebook::{normalize_size, Annotation, VolumeSpec, VolumeType, ROK_ORIGIN_ANNOTATION};

/// Volumes as the compiler expects them
///
/// With a snapshot origin, `clone` volumes become `new_pvc` volumes restored
/// from that snapshot. `snap` volumes are always sent as `new_pvc`; their
/// origin annotation is already set.
#[must_use]
pub fn deploy_volumes(volumes: &[VolumeSpec], origin: Option<&str>) -> Vec<VolumeSpec> {
    volumes
        .iter()
        .map(|volume| match (volume.volume_type, origin) {
            (VolumeType::Clone, Some(origin)) => {
                let mut annotations = Vec::with_capacity(volume.annotations.len() + 1);
                annotations.push(Annotation::new(ROK_ORIGIN_ANNOTATION, origin));
                annotations.extend(
                    volume
                        .annotations
                        .iter()
                        .filter(|a| a.key != ROK_ORIGIN_ANNOTATION)
                        .cloned(),
                );
                VolumeSpec {
                    volume_type: VolumeType::NewPvc,
                    annotations,
                    ..volume.clone()
                }
            }
            (VolumeType::Clone, None) => {
                tracing::warn!(
                    name = %volume.name,
                    "clone volume without a snapshot is passed through unchanged"
                );
                volume.clone()
            }
            (VolumeType::Snap, _) => VolumeSpec {
                volume_type: VolumeType::NewPvc,
                ..volume.clone()
            },
            _ => volume.clone(),
        })
        .collect()
}

/// Volumes reported by the notebook server, ready for the volumes panel
///
/// Sizes arrive in bytes and are expressed in the largest unit they reach.
/// Annotations are cleared.
#[must_use]
pub fn panel_mounted_volumes(volumes: Vec<VolumeSpec>) -> Vec<VolumeSpec> {
    volumes
        .into_iter()
        .map(|mut volume| {
            let (size, unit) = normalize_size(volume.size.unwrap_or(0));
            volume.size = Some(size);
            volume.size_type = Some(unit.as_str().to_string());
            volume.annotations.clear();
            volume
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn volume(volume_type: VolumeType) -> VolumeSpec {
        VolumeSpec {
            volume_type,
            name: "workspace".into(),
            mount_point: "/home/jovyan".into(),
            ..VolumeSpec::empty()
        }
    }

    #[test]
    fn clone_becomes_restored_pvc() {
        let mut clone = volume(VolumeType::Clone);
        clone.annotations.push(Annotation::new("team", "ml"));
        let out = deploy_volumes(&[clone, volume(VolumeType::Pvc)], Some("b/o/v1"));

        assert_eq!(out[0].volume_type, VolumeType::NewPvc);
        assert_eq!(
            out[0].annotations,
            vec![
                Annotation::new(ROK_ORIGIN_ANNOTATION, "b/o/v1"),
                Annotation::new("team", "ml")
            ]
        );
        assert!(out[0].is_snapshot_restore());
        assert_eq!(out[1], volume(VolumeType::Pvc));
    }

    #[test]
    fn clone_without_origin_is_unchanged() {
        let out = deploy_volumes(&[volume(VolumeType::Clone)], None);
        assert_eq!(out[0].volume_type, VolumeType::Clone);
    }

    #[test]
    fn snap_is_sent_as_new_pvc() {
        let mut snap = volume(VolumeType::Snap);
        snap.annotations.push(Annotation::new(ROK_ORIGIN_ANNOTATION, "x/y/z"));
        let out = deploy_volumes(&[snap], None);
        assert_eq!(out[0].volume_type, VolumeType::NewPvc);
        assert_eq!(out[0].annotations[0].value, "x/y/z");
    }

    #[test]
    fn mounted_sizes_are_normalized() {
        let mut mounted = volume(VolumeType::Clone);
        mounted.size = Some(5 * 1024 * 1024 * 1024);
        mounted.size_type = None;
        mounted.annotations.push(Annotation::new("k", "v"));
        let out = panel_mounted_volumes(vec![mounted]);
        assert_eq!(out[0].size, Some(5));
        assert_eq!(out[0].size_type.as_deref(), Some("Gi"));
        assert!(out[0].annotations.is_empty());
    }
}
