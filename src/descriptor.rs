//! Module descriptor parsing
//!
//! A descriptor is an XML document in the `urn:jboss:module:1.0` namespace
//! describing one module: its dependencies with per-edge import/export
//! filter rules, its resource roots, and an optional main symbol. Parsing
//! validates the document strictly; any unknown element or attribute,
//! missing required attribute, or duplicated section is rejected with the
//! byte offset of the offending content.

use crate::dependency::DependencySpec;
use crate::error::{ModuleError, Result};
use crate::filter::{MultiplePathFilterBuilder, PathFilter};
use crate::fs::{ArchiveResourceLoader, FileResourceLoader};
use crate::ident::ModuleIdentifier;
use crate::spec::{ModuleSpec, ModuleSpecBuilder, ResourceRoot};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use std::path::Path;
use std::sync::Arc;

const NAMESPACE: &str = "urn:jboss:module:1.0";

/// Parse a `module.xml` document into a [`ModuleSpec`].
///
/// `root_dir` anchors relative resource-root paths; `expected` must match
/// the document's own identifier. A local dependency on the module's own
/// resources is appended after all explicit dependencies.
pub fn parse(root_dir: &Path, expected: &ModuleIdentifier, text: &str) -> Result<ModuleSpec> {
    let mut parser = DescriptorParser {
        reader: NsReader::from_str(text),
        root_dir,
    };
    parser.parse_document(expected)
}

struct DescriptorParser<'a> {
    reader: NsReader<&'a [u8]>,
    root_dir: &'a Path,
}

impl<'a> DescriptorParser<'a> {
    fn error(&self, message: impl Into<String>) -> ModuleError {
        ModuleError::InvalidDescriptor {
            message: message.into(),
            position: self.reader.buffer_position() as u64,
        }
    }

    /// Pull the next event, skipping comments, declarations, and
    /// inter-element whitespace
    fn next_event(&mut self) -> Result<(Option<String>, Event<'a>)> {
        loop {
            let (resolve, event) = match self.reader.read_resolved_event() {
                Ok(pair) => pair,
                Err(e) => {
                    let message = e.to_string();
                    return Err(self.error(message));
                }
            };
            match event {
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) => continue,
                Event::Text(text) => {
                    let content = match text.unescape() {
                        Ok(content) => content.trim().to_string(),
                        Err(e) => {
                            let message = e.to_string();
                            return Err(self.error(message));
                        }
                    };
                    if content.is_empty() {
                        continue;
                    }
                    return Err(self.error(format!("unexpected text content {:?}", content)));
                }
                event => {
                    let namespace = match resolve {
                        ResolveResult::Bound(ns) => {
                            Some(String::from_utf8_lossy(ns.0).into_owned())
                        }
                        _ => None,
                    };
                    return Ok((namespace, event));
                }
            }
        }
    }

    fn check_namespace(&self, namespace: &Option<String>) -> Result<()> {
        match namespace.as_deref() {
            Some(NAMESPACE) => Ok(()),
            Some(other) => Err(self.error(format!("unexpected namespace {:?}", other))),
            None => Err(self.error(format!("element must be in namespace {:?}", NAMESPACE))),
        }
    }

    fn parse_document(&mut self, expected: &ModuleIdentifier) -> Result<ModuleSpec> {
        loop {
            match self.next_event()? {
                (namespace, Event::Start(element)) => {
                    self.check_namespace(&namespace)?;
                    if element.local_name().as_ref() != b"module" {
                        return Err(self.error("expected root element <module>"));
                    }
                    let mut builder = self.parse_module_attributes(&element, expected)?;
                    self.parse_module_contents(&mut builder)?;
                    self.expect_document_end()?;
                    return Ok(builder.create());
                }
                (namespace, Event::Empty(element)) => {
                    self.check_namespace(&namespace)?;
                    if element.local_name().as_ref() != b"module" {
                        return Err(self.error("expected root element <module>"));
                    }
                    let mut builder = self.parse_module_attributes(&element, expected)?;
                    builder.add_dependency(DependencySpec::local());
                    self.expect_document_end()?;
                    return Ok(builder.create());
                }
                (_, Event::Eof) => return Err(self.error("unexpected end of document")),
                (_, event) => {
                    return Err(self.error(format!("unexpected content {:?}", event)));
                }
            }
        }
    }

    fn parse_module_attributes(
        &mut self,
        element: &BytesStart<'a>,
        expected: &ModuleIdentifier,
    ) -> Result<ModuleSpecBuilder> {
        let (name, slot) = self.parse_name_and_slot(element)?;
        let name = name.ok_or_else(|| self.error("missing required attribute 'name'"))?;
        let identifier = self.identifier_from(&name, slot.as_deref())?;
        if &identifier != expected {
            return Err(self.error(format!(
                "mismatched module name {} (expected {})",
                identifier, expected
            )));
        }
        Ok(ModuleSpec::build(identifier))
    }

    fn identifier_from(&self, name: &str, slot: Option<&str>) -> Result<ModuleIdentifier> {
        let base: ModuleIdentifier = name
            .parse()
            .map_err(|_| self.error(format!("invalid module name {:?}", name)))?;
        match slot {
            None => Ok(base),
            Some(slot) => {
                if base.slot().is_some() {
                    return Err(self.error(format!(
                        "module name {:?} already carries a slot",
                        name
                    )));
                }
                Ok(ModuleIdentifier::with_slot(base.group(), base.artifact(), slot))
            }
        }
    }

    /// Shared attribute handling for `<module>` both as root and as a
    /// dependency: `name` and `slot` only
    fn parse_name_and_slot(
        &self,
        element: &BytesStart<'a>,
    ) -> Result<(Option<String>, Option<String>)> {
        let mut name = None;
        let mut slot = None;
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| self.error(e.to_string()))?;
            let key = attribute.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let value = attribute
                .unescape_value()
                .map_err(|e| self.error(e.to_string()))?
                .into_owned();
            match key {
                b"name" => name = Some(value),
                b"slot" => slot = Some(value),
                other => {
                    return Err(self.error(format!(
                        "unexpected attribute {:?}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }
        Ok((name, slot))
    }

    fn parse_module_contents(&mut self, builder: &mut ModuleSpecBuilder) -> Result<()> {
        let mut seen_dependencies = false;
        let mut seen_resources = false;
        let mut seen_main = false;
        loop {
            match self.next_event()? {
                (_, Event::End(_)) => {
                    // A module always ends with a dependency on its own
                    // resources, after all explicit dependencies.
                    builder.add_dependency(DependencySpec::local());
                    return Ok(());
                }
                (namespace, Event::Start(element)) => {
                    self.check_namespace(&namespace)?;
                    match element.local_name().as_ref() {
                        b"dependencies" => {
                            self.reject_duplicate(&mut seen_dependencies, "dependencies")?;
                            self.parse_dependencies(builder)?;
                        }
                        b"resources" => {
                            self.reject_duplicate(&mut seen_resources, "resources")?;
                            self.parse_resources(builder)?;
                        }
                        b"main-class" => {
                            self.reject_duplicate(&mut seen_main, "main-class")?;
                            self.parse_main_symbol(&element, builder)?;
                            self.expect_element_end()?;
                        }
                        other => {
                            return Err(self.error(format!(
                                "unexpected element {:?}",
                                String::from_utf8_lossy(other)
                            )))
                        }
                    }
                }
                (namespace, Event::Empty(element)) => {
                    self.check_namespace(&namespace)?;
                    match element.local_name().as_ref() {
                        b"dependencies" => {
                            self.reject_duplicate(&mut seen_dependencies, "dependencies")?
                        }
                        b"resources" => self.reject_duplicate(&mut seen_resources, "resources")?,
                        b"main-class" => {
                            self.reject_duplicate(&mut seen_main, "main-class")?;
                            self.parse_main_symbol(&element, builder)?;
                        }
                        other => {
                            return Err(self.error(format!(
                                "unexpected element {:?}",
                                String::from_utf8_lossy(other)
                            )))
                        }
                    }
                }
                (_, Event::Eof) => return Err(self.error("unexpected end of document")),
                (_, event) => return Err(self.error(format!("unexpected content {:?}", event))),
            }
        }
    }

    fn reject_duplicate(&self, seen: &mut bool, element: &str) -> Result<()> {
        if *seen {
            return Err(self.error(format!("duplicate element <{}>", element)));
        }
        *seen = true;
        Ok(())
    }

    fn parse_dependencies(&mut self, builder: &mut ModuleSpecBuilder) -> Result<()> {
        loop {
            match self.next_event()? {
                (_, Event::End(_)) => return Ok(()),
                (namespace, Event::Start(element)) => {
                    self.check_namespace(&namespace)?;
                    if element.local_name().as_ref() != b"module" {
                        return Err(self.error("only <module> dependencies are allowed"));
                    }
                    let spec = self.parse_module_dependency(&element, false)?;
                    builder.add_dependency(spec);
                }
                (namespace, Event::Empty(element)) => {
                    self.check_namespace(&namespace)?;
                    if element.local_name().as_ref() != b"module" {
                        return Err(self.error("only <module> dependencies are allowed"));
                    }
                    let spec = self.parse_module_dependency(&element, true)?;
                    builder.add_dependency(spec);
                }
                (_, Event::Eof) => return Err(self.error("unexpected end of document")),
                (_, event) => return Err(self.error(format!("unexpected content {:?}", event))),
            }
        }
    }

    fn parse_module_dependency(
        &mut self,
        element: &BytesStart<'a>,
        empty: bool,
    ) -> Result<DependencySpec> {
        let mut name = None;
        let mut slot = None;
        let mut export = false;
        let mut optional = false;
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| self.error(e.to_string()))?;
            let key = attribute.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let value = attribute
                .unescape_value()
                .map_err(|e| self.error(e.to_string()))?
                .into_owned();
            match key {
                b"name" => name = Some(value),
                b"slot" => slot = Some(value),
                b"export" => export = value == "true",
                b"optional" => optional = value == "true",
                other => {
                    return Err(self.error(format!(
                        "unexpected attribute {:?}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }
        let name = name.ok_or_else(|| self.error("missing required attribute 'name'"))?;
        let identifier = self.identifier_from(&name, slot.as_deref())?;

        let mut import_builder = MultiplePathFilterBuilder::new(true);
        let mut export_builder = MultiplePathFilterBuilder::new(true);
        if !empty {
            loop {
                match self.next_event()? {
                    (_, Event::End(_)) => break,
                    (namespace, Event::Start(element)) => {
                        self.check_namespace(&namespace)?;
                        match element.local_name().as_ref() {
                            b"imports" => self.parse_filter_list(&mut import_builder)?,
                            b"exports" => self.parse_filter_list(&mut export_builder)?,
                            other => {
                                return Err(self.error(format!(
                                    "unexpected element {:?}",
                                    String::from_utf8_lossy(other)
                                )))
                            }
                        }
                    }
                    (namespace, Event::Empty(element)) => {
                        self.check_namespace(&namespace)?;
                        match element.local_name().as_ref() {
                            b"imports" | b"exports" => {}
                            other => {
                                return Err(self.error(format!(
                                    "unexpected element {:?}",
                                    String::from_utf8_lossy(other)
                                )))
                            }
                        }
                    }
                    (_, Event::Eof) => return Err(self.error("unexpected end of document")),
                    (_, event) => {
                        return Err(self.error(format!("unexpected content {:?}", event)))
                    }
                }
            }
        }

        let export_filter = if export {
            export_builder.build()
        } else {
            PathFilter::reject_all()
        };
        Ok(DependencySpec::module_dependency(identifier)
            .optional(optional)
            .import_filter(import_builder.build())
            .export_filter(export_filter)
            .build())
    }

    fn parse_filter_list(&mut self, builder: &mut MultiplePathFilterBuilder) -> Result<()> {
        loop {
            match self.next_event()? {
                (_, Event::End(_)) => return Ok(()),
                (namespace, event @ (Event::Start(_) | Event::Empty(_))) => {
                    self.check_namespace(&namespace)?;
                    let (element, empty) = match &event {
                        Event::Start(e) => (e.clone(), false),
                        Event::Empty(e) => (e.clone(), true),
                        _ => unreachable!(),
                    };
                    let include = match element.local_name().as_ref() {
                        b"include" => true,
                        b"exclude" => false,
                        other => {
                            return Err(self.error(format!(
                                "unexpected element {:?}",
                                String::from_utf8_lossy(other)
                            )))
                        }
                    };
                    let path = self.required_path_attribute(&element)?;
                    builder.add(PathFilter::match_path(&path), include);
                    if !empty {
                        self.expect_element_end()?;
                    }
                }
                (_, Event::Eof) => return Err(self.error("unexpected end of document")),
                (_, event) => return Err(self.error(format!("unexpected content {:?}", event))),
            }
        }
    }

    fn parse_resources(&mut self, builder: &mut ModuleSpecBuilder) -> Result<()> {
        loop {
            match self.next_event()? {
                (_, Event::End(_)) => return Ok(()),
                (namespace, event @ (Event::Start(_) | Event::Empty(_))) => {
                    self.check_namespace(&namespace)?;
                    let (element, empty) = match &event {
                        Event::Start(e) => (e.clone(), false),
                        Event::Empty(e) => (e.clone(), true),
                        _ => unreachable!(),
                    };
                    if element.local_name().as_ref() != b"resource-root" {
                        return Err(self.error(format!(
                            "unexpected element {:?}",
                            String::from_utf8_lossy(element.local_name().as_ref())
                        )));
                    }
                    self.parse_resource_root(&element, empty, builder)?;
                }
                (_, Event::Eof) => return Err(self.error("unexpected end of document")),
                (_, event) => return Err(self.error(format!("unexpected content {:?}", event))),
            }
        }
    }

    fn parse_resource_root(
        &mut self,
        element: &BytesStart<'a>,
        empty: bool,
        builder: &mut ModuleSpecBuilder,
    ) -> Result<()> {
        let mut name = None;
        let mut path = None;
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| self.error(e.to_string()))?;
            let key = attribute.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let value = attribute
                .unescape_value()
                .map_err(|e| self.error(e.to_string()))?
                .into_owned();
            match key {
                b"name" => name = Some(value),
                b"path" => path = Some(value),
                other => {
                    return Err(self.error(format!(
                        "unexpected attribute {:?}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }
        let path = path.ok_or_else(|| self.error("missing required attribute 'path'"))?;
        let name = name.unwrap_or_else(|| path.clone());

        let mut filter_builder = MultiplePathFilterBuilder::new(true);
        let mut has_filter = false;
        if !empty {
            loop {
                match self.next_event()? {
                    (_, Event::End(_)) => break,
                    (namespace, Event::Start(element)) => {
                        self.check_namespace(&namespace)?;
                        if element.local_name().as_ref() != b"exports" {
                            return Err(self.error("only <exports> is allowed in a resource root"));
                        }
                        has_filter = true;
                        self.parse_filter_list(&mut filter_builder)?;
                    }
                    (namespace, Event::Empty(element)) => {
                        self.check_namespace(&namespace)?;
                        if element.local_name().as_ref() != b"exports" {
                            return Err(self.error("only <exports> is allowed in a resource root"));
                        }
                    }
                    (_, Event::Eof) => return Err(self.error("unexpected end of document")),
                    (_, event) => {
                        return Err(self.error(format!("unexpected content {:?}", event)))
                    }
                }
            }
        }

        let filter = if has_filter {
            filter_builder.build()
        } else {
            PathFilter::accept_all()
        };
        let full_path = self.root_dir.join(&path);
        let root = if full_path.is_dir() {
            let loader = FileResourceLoader::new(name.clone(), &full_path)?;
            ResourceRoot::with_filter(name, Arc::new(loader), filter)
        } else if full_path.is_file() {
            let loader = ArchiveResourceLoader::open(name.clone(), &full_path)?;
            ResourceRoot::with_filter(name, Arc::new(loader), filter)
        } else {
            return Err(self.error(format!("resource root {:?} does not exist", path)));
        };
        builder.add_root(root);
        Ok(())
    }

    fn parse_main_symbol(
        &mut self,
        element: &BytesStart<'a>,
        builder: &mut ModuleSpecBuilder,
    ) -> Result<()> {
        let mut name = None;
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| self.error(e.to_string()))?;
            let key = attribute.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            match key {
                b"name" => {
                    name = Some(
                        attribute
                            .unescape_value()
                            .map_err(|e| self.error(e.to_string()))?
                            .into_owned(),
                    )
                }
                other => {
                    return Err(self.error(format!(
                        "unexpected attribute {:?}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }
        let name = name.ok_or_else(|| self.error("missing required attribute 'name'"))?;
        builder.set_main_symbol(name);
        Ok(())
    }

    /// Consume the end tag of an element that allows no content
    fn required_path_attribute(&self, element: &BytesStart<'a>) -> Result<String> {
        let mut path = None;
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| self.error(e.to_string()))?;
            let key = attribute.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let value = attribute
                .unescape_value()
                .map_err(|e| self.error(e.to_string()))?
                .into_owned();
            match key {
                b"path" => path = Some(value),
                other => {
                    return Err(self.error(format!(
                        "unexpected attribute {:?}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }
        path.ok_or_else(|| self.error("missing required attribute 'path'"))
    }

    fn expect_element_end(&mut self) -> Result<()> {
        match self.next_event()? {
            (_, Event::End(_)) => Ok(()),
            (_, event) => Err(self.error(format!("unexpected content {:?}", event))),
        }
    }

    fn expect_document_end(&mut self) -> Result<()> {
        loop {
            match self.next_event()? {
                (_, Event::Eof) => return Ok(()),
                (_, event) => return Err(self.error(format!("unexpected content {:?}", event))),
            }
        }
    }
}
