use std::io::{self, Write};

use crate::{
    ast::{NodeKind, NodeRef, Resolution},
    generators::{Generator, GeneratorError},
};

/// Configuration settings for the outline writer.
#[derive(Debug, Clone)]
pub struct OutlineConfig {
    /// Number of spaces to use for each indentation level.
    pub indent_spaces: u8,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        OutlineConfig { indent_spaces: 4 }
    }
}

/// Writes an indented, human-readable outline of every declaration it is
/// handed.
///
/// ```text
/// struct Packet @packed
///     len: u16
///     next: Packet* (unresolved)
/// proc send(p: Packet*) -> bool
/// ```
pub struct OutlineGenerator<W: Write> {
    /// The configuration settings for the outline.
    config: OutlineConfig,
    /// The underlying writer object where the outline is streamed.
    writer: W,
    /// The current indentation level.
    current_indent_level: u8,
    declarations: usize,
}

impl<W: Write> OutlineGenerator<W> {
    /// Creates a new `OutlineGenerator` instance.
    ///
    /// # Arguments
    ///
    /// * `writer` - The output sink where the outline will be written.
    /// * `config` - Optional configuration; uses default if None is provided.
    pub fn new(writer: W, config: Option<OutlineConfig>) -> Self {
        OutlineGenerator {
            config: config.unwrap_or_default(),
            writer,
            current_indent_level: 0,
            declarations: 0,
        }
    }

    /// Number of declarations written so far.
    pub fn declarations(&self) -> usize {
        self.declarations
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Helper function to write a line with the appropriate indentation.
    fn write_line(&mut self, content: &str) -> io::Result<()> {
        let indent = " ".repeat(self.current_indent_level as usize * self.config.indent_spaces as usize);
        writeln!(&mut self.writer, "{indent}{content}")
    }

    /// Increases the current indentation level.
    pub fn increase_indent(&mut self) {
        self.current_indent_level = self.current_indent_level.saturating_add(1);
    }

    /// Decreases the current indentation level, preventing it from going below zero.
    pub fn decrease_indent(&mut self) {
        self.current_indent_level = self.current_indent_level.saturating_sub(1);
    }

    fn write_body(&mut self, lines: Vec<String>) -> io::Result<()> {
        self.increase_indent();
        for line in &lines {
            self.write_line(line)?;
        }
        self.decrease_indent();
        Ok(())
    }
}

impl<W: Write> Generator for OutlineGenerator<W> {
    fn on_declaration(&mut self, decl: NodeRef<'_>, _filename: &str) -> Result<(), GeneratorError> {
        let keyword = decl.kind().keyword().unwrap_or("decl");
        let name = decl.name().unwrap_or_default();

        match decl.kind() {
            NodeKind::ProcedureDecl => {
                let params: Vec<String> = decl.fields().map(field).collect();
                let returns = decl
                    .type_expr()
                    .map(|ty| format!(" -> {}", type_name(ty)))
                    .unwrap_or_default();
                self.write_line(&format!(
                    "{keyword} {name}({}){returns}{}",
                    params.join(", "),
                    tags(decl)
                ))?;
            }
            NodeKind::EnumDecl | NodeKind::FlagsDecl => {
                self.write_line(&format!("{keyword} {name}{}", tags(decl)))?;
                let members = decl
                    .members()
                    .map(|member| {
                        let value = member.value().unwrap_or_default();
                        let value = match decl.kind() {
                            NodeKind::FlagsDecl => format!("{value:#x}"),
                            _ => value.to_string(),
                        };
                        format!(
                            "{} = {value}{}",
                            member.name().unwrap_or_default(),
                            tags(member)
                        )
                    })
                    .collect();
                self.write_body(members)?;
            }
            _ => {
                self.write_line(&format!("{keyword} {name}{}", tags(decl)))?;
                self.write_body(decl.fields().map(field).collect())?;
            }
        }

        self.writer.flush()?;
        self.declarations += 1;
        Ok(())
    }
}

fn field(node: NodeRef<'_>) -> String {
    let ty = node.type_expr().map(type_name).unwrap_or_default();
    format!("{}: {ty}{}", node.name().unwrap_or_default(), tags(node))
}

/// `Name**[4][]`, marked when the patch pass could not link it.
fn type_name(ty: NodeRef<'_>) -> String {
    let mut out = ty.name().unwrap_or_default().to_string();
    let Some(type_ref) = ty.type_ref() else {
        return out;
    };

    out.push_str(&"*".repeat(type_ref.pointer_depth as usize));
    for length in &type_ref.array_lengths {
        out.push_str(&length.to_string());
    }
    if matches!(type_ref.resolution, Resolution::Pending | Resolution::Undeclared) {
        out.push_str(" (unresolved)");
    }
    out
}

fn tags(node: NodeRef<'_>) -> String {
    node.tags()
        .map(|tag| {
            let name = tag.name().unwrap_or_default();
            let args: Vec<&str> = tag.children().filter_map(|arg| arg.name()).collect();
            if args.is_empty() {
                format!(" @{name}")
            } else {
                format!(" @{name}({})", args.join(", "))
            }
        })
        .collect()
}
