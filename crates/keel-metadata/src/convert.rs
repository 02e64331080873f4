use crate::{ConvertedMetadata, EdmxConverter, EdmxDocument, EdmxError, EntitySet, MergedEdmx};

/// Production converter backed by `roxmltree`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlEdmxConverter;

impl XmlEdmxConverter {
    pub fn new() -> Self {
        Self
    }
}

impl EdmxConverter for XmlEdmxConverter {
    fn parse(&self, text: &str, label: &str) -> Result<EdmxDocument, EdmxError> {
        let doc = roxmltree::Document::parse(text).map_err(|source| EdmxError::Xml {
            label: label.to_string(),
            source,
        })?;

        let root = doc.root_element();
        if root.tag_name().name() != "Edmx" {
            return Err(EdmxError::NotEdmx {
                label: label.to_string(),
                root: root.tag_name().name().to_string(),
            });
        }

        Ok(EdmxDocument {
            label: label.to_string(),
            text: text.to_string(),
        })
    }

    fn convert(&self, merged: &MergedEdmx) -> Result<ConvertedMetadata, EdmxError> {
        let base = parse_validated(&merged.base)?;
        let root = base.root_element();
        let odata_version = root.attribute("Version").unwrap_or_default().to_string();

        let schema = descendant(&base, "Schema").ok_or_else(|| EdmxError::MissingSchema {
            label: merged.base.label.clone(),
        })?;
        let namespace = schema.attribute("Namespace").unwrap_or_default().to_string();

        let mut entity_sets = Vec::new();
        for node in base.descendants().filter(element_named("EntitySet")) {
            let (Some(name), Some(entity_type)) =
                (node.attribute("Name"), node.attribute("EntityType"))
            else {
                continue;
            };
            entity_sets.push(EntitySet {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
            });
        }

        let mut annotation_targets = Vec::new();
        collect_annotation_targets(&base, &mut annotation_targets);
        for overlay in &merged.overlays {
            let doc = match parse_validated(overlay) {
                Ok(doc) => doc,
                Err(err) => {
                    // One bad overlay must not sink the whole service.
                    tracing::debug!(
                        target = "keel.metadata",
                        label = %overlay.label,
                        error = %err,
                        "skipping unparsable annotation overlay"
                    );
                    continue;
                }
            };
            collect_annotation_targets(&doc, &mut annotation_targets);
        }

        Ok(ConvertedMetadata {
            namespace,
            odata_version,
            entity_sets,
            annotation_targets,
        })
    }
}

fn parse_validated(doc: &EdmxDocument) -> Result<roxmltree::Document<'_>, EdmxError> {
    roxmltree::Document::parse(&doc.text).map_err(|source| EdmxError::Xml {
        label: doc.label.clone(),
        source,
    })
}

fn descendant<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    name: &'static str,
) -> Option<roxmltree::Node<'a, 'input>> {
    doc.descendants().find(element_named(name))
}

fn element_named(name: &'static str) -> impl Fn(&roxmltree::Node<'_, '_>) -> bool {
    move |node| node.is_element() && node.tag_name().name() == name
}

fn collect_annotation_targets(doc: &roxmltree::Document<'_>, out: &mut Vec<String>) {
    for node in doc.descendants().filter(element_named("Annotations")) {
        if let Some(target) = node.attribute("Target") {
            if !out.iter().any(|existing| existing == target) {
                out.push(target.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="my.bookshop">
      <EntityType Name="Books"><Key><PropertyRef Name="ID"/></Key></EntityType>
      <EntityContainer Name="EntityContainer">
        <EntitySet Name="Books" EntityType="my.bookshop.Books"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    const ANNOTATIONS: &str = r#"<edmx:Edmx xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx" Version="4.0">
  <edmx:DataServices>
    <Schema xmlns="http://docs.oasis-open.org/odata/ns/edm" Namespace="my.bookshop.annotations">
      <Annotations Target="my.bookshop.Books"/>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn converts_entity_sets_and_overlay_targets() {
        let converter = XmlEdmxConverter::new();
        let base = converter.parse(METADATA, "metadata.xml").unwrap();
        let overlay = converter.parse(ANNOTATIONS, "annotations.xml").unwrap();
        let merged = converter.merge(base, vec![overlay]);
        let converted = converter.convert(&merged).unwrap();

        assert_eq!(converted.namespace, "my.bookshop");
        assert_eq!(converted.odata_version, "4.0");
        assert_eq!(
            converted.entity_sets,
            vec![EntitySet {
                name: "Books".to_string(),
                entity_type: "my.bookshop.Books".to_string(),
            }]
        );
        assert_eq!(converted.annotation_targets, vec!["my.bookshop.Books"]);
    }

    #[test]
    fn rejects_non_edmx_root() {
        let converter = XmlEdmxConverter::new();
        let err = converter
            .parse("<mvc:View xmlns:mvc=\"sap.ui.core.mvc\"/>", "view.xml")
            .unwrap_err();
        assert!(matches!(err, EdmxError::NotEdmx { .. }));
    }

    #[test]
    fn bad_overlay_is_skipped_not_fatal() {
        let converter = XmlEdmxConverter::new();
        let base = converter.parse(METADATA, "metadata.xml").unwrap();
        let merged = converter.merge(
            base,
            vec![EdmxDocument {
                label: "broken.xml".to_string(),
                text: "<not closed".to_string(),
            }],
        );
        let converted = converter.convert(&merged).unwrap();
        assert_eq!(converted.entity_sets.len(), 1);
    }
}
