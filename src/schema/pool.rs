//! The symbol table that owns all loaded descriptors.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Error, ErrorKind};
use crate::schema::bootstrap::{DescriptorProto, EnumDescriptorProto, FileDescriptorSet};
use crate::schema::descriptor::{
    EnumDescriptor, FieldDescriptor, FieldType, Label, MessageDescriptor, TypeRef,
};
use crate::value::Value;

/// What a fully-qualified name resolves to.
#[derive(Copy, Clone, Debug)]
enum Symbol {
    Message(usize),
    Enum(usize),
}

/// Owns every descriptor loaded from one or more descriptor sets and
/// resolves fully-qualified dotted names.
///
/// Loading happens in two passes: the descriptor set is decoded and all
/// entities are allocated with their type references recorded by name, then
/// the pool is sealed by resolving each reference to a direct pool index and
/// computing each message's reflected layout. A pool that has been populated
/// is immutable apart from further `add_descriptor_set` calls, each of which
/// either commits completely or leaves the pool untouched; behind an
/// [`Arc`] it can be shared freely, including across threads.
///
/// ```
/// use dynpb::SchemaPool;
///
/// # fn main() -> Result<(), dynpb::Error> {
/// # let descriptor_set_bytes: &[u8] = &[];
/// let mut pool = SchemaPool::new();
/// pool.add_descriptor_set(descriptor_set_bytes)?;
/// if let Some(msg) = pool.message("pkg.Msg") {
///     println!("{} has {} fields", msg.full_name(), msg.fields().len());
/// }
/// # Ok(()) }
/// ```
pub struct SchemaPool {
    messages: Vec<Arc<MessageDescriptor>>,
    enums: Vec<Arc<EnumDescriptor>>,
    symbols: FxHashMap<String, Symbol>,
}

/// A message collected in the parse pass, before references resolve.
struct StagedMessage {
    full_name: String,
    proto: DescriptorProto,
}

impl SchemaPool {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            enums: Vec::new(),
            symbols: FxHashMap::default(),
        }
    }

    /// Load a serialized `FileDescriptorSet` into the pool.
    ///
    /// On error the pool is left unchanged.
    pub fn add_descriptor_set(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let set = FileDescriptorSet::decode(bytes)
            .map_err(|err| Error::new(ErrorKind::MalformedDescriptor).with_context(err.context(), err.field()))?;

        // Parse pass: walk the file tree, assign pool indices and register
        // fully-qualified names. Nothing is committed to `self` yet.
        let mut staged = Staging {
            messages: Vec::new(),
            enums: Vec::new(),
            symbols: FxHashMap::default(),
            message_base: self.messages.len(),
            enum_base: self.enums.len(),
        };
        for file in set.files {
            let scope = file.package.unwrap_or_default();
            for en in file.enums {
                staged.collect_enum(self, &scope, en)?;
            }
            for msg in file.messages {
                staged.collect_message(self, &scope, msg)?;
            }
        }

        // Seal pass: enums carry no references and are built first so that
        // enum field defaults can resolve against them.
        let mut new_enums = Vec::with_capacity(staged.enums.len());
        for (full_name, proto) in &staged.enums {
            new_enums.push(Arc::new(build_enum(full_name, proto)?));
        }

        let mut new_messages = Vec::with_capacity(staged.messages.len());
        for msg in &staged.messages {
            let descriptor = build_message(
                msg,
                |name| staged.resolve(self, name),
                &self.enums,
                &new_enums,
            )?;
            new_messages.push(Arc::new(descriptor));
        }

        // Commit.
        self.messages.append(&mut new_messages);
        self.enums.append(&mut new_enums);
        self.symbols.extend(staged.symbols);
        Ok(())
    }

    /// Look up a message descriptor by fully-qualified name.
    ///
    /// A leading dot, as used in descriptor type references, is accepted.
    pub fn message(&self, name: &str) -> Option<&Arc<MessageDescriptor>> {
        match self.symbols.get(trim_name(name))? {
            Symbol::Message(index) => Some(&self.messages[*index]),
            Symbol::Enum(_) => None,
        }
    }

    /// Look up an enum descriptor by fully-qualified name.
    pub fn enum_type(&self, name: &str) -> Option<&Arc<EnumDescriptor>> {
        match self.symbols.get(trim_name(name))? {
            Symbol::Enum(index) => Some(&self.enums[*index]),
            Symbol::Message(_) => None,
        }
    }

    /// The message descriptor at a pool index, as recorded in
    /// [`FieldDescriptor::message_index`].
    pub fn message_at(&self, index: usize) -> &Arc<MessageDescriptor> {
        &self.messages[index]
    }

    /// The enum descriptor at a pool index.
    pub fn enum_at(&self, index: usize) -> &Arc<EnumDescriptor> {
        &self.enums[index]
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }
}

impl Default for SchemaPool {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_name(name: &str) -> &str {
    name.strip_prefix('.').unwrap_or(name)
}

fn join_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

struct Staging {
    messages: Vec<StagedMessage>,
    enums: Vec<(String, EnumDescriptorProto)>,
    symbols: FxHashMap<String, Symbol>,
    message_base: usize,
    enum_base: usize,
}

impl Staging {
    fn register(&mut self, pool: &SchemaPool, name: &str, symbol: Symbol) -> Result<(), Error> {
        if pool.symbols.contains_key(name) || self.symbols.contains_key(name) {
            return Err(Error::new(ErrorKind::DuplicateSymbol).with_context(Some(name), None));
        }
        self.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    fn collect_message(
        &mut self,
        pool: &SchemaPool,
        scope: &str,
        mut proto: DescriptorProto,
    ) -> Result<(), Error> {
        let name = proto.name.take().ok_or_else(malformed)?;
        let full_name = join_name(scope, &name);
        self.register(pool, &full_name, Symbol::Message(self.message_base + self.messages.len()))?;

        let nested = std::mem::take(&mut proto.nested);
        let enums = std::mem::take(&mut proto.enums);
        self.messages.push(StagedMessage {
            full_name: full_name.clone(),
            proto,
        });

        for en in enums {
            self.collect_enum(pool, &full_name, en)?;
        }
        for nested_proto in nested {
            self.collect_message(pool, &full_name, nested_proto)?;
        }
        Ok(())
    }

    fn collect_enum(
        &mut self,
        pool: &SchemaPool,
        scope: &str,
        mut proto: EnumDescriptorProto,
    ) -> Result<(), Error> {
        let name = proto.name.take().ok_or_else(malformed)?;
        let full_name = join_name(scope, &name);
        self.register(pool, &full_name, Symbol::Enum(self.enum_base + self.enums.len()))?;
        self.enums.push((full_name, proto));
        Ok(())
    }

    fn resolve(&self, pool: &SchemaPool, name: &str) -> Option<Symbol> {
        let name = trim_name(name);
        self.symbols
            .get(name)
            .or_else(|| pool.symbols.get(name))
            .copied()
    }
}

fn malformed() -> Error {
    Error::new(ErrorKind::MalformedDescriptor)
}

fn build_enum(full_name: &str, proto: &EnumDescriptorProto) -> Result<EnumDescriptor, Error> {
    let mut by_name = FxHashMap::default();
    let mut by_number = FxHashMap::default();
    let mut default = None;
    for value in &proto.values {
        let name = value
            .name
            .clone()
            .ok_or_else(|| malformed().with_context(Some(full_name), None))?;
        let number = value
            .number
            .ok_or_else(|| malformed().with_context(Some(full_name), None))?;
        if by_name.insert(name.clone(), number).is_some() {
            return Err(Error::new(ErrorKind::DuplicateSymbol).with_context(Some(full_name), None));
        }
        by_number.entry(number).or_insert(name);
        default.get_or_insert(number);
    }
    Ok(EnumDescriptor {
        full_name: full_name.to_string(),
        by_name,
        by_number,
        default: default.unwrap_or(0),
    })
}

fn build_message(
    staged: &StagedMessage,
    resolve: impl Fn(&str) -> Option<Symbol>,
    old_enums: &[Arc<EnumDescriptor>],
    new_enums: &[Arc<EnumDescriptor>],
) -> Result<MessageDescriptor, Error> {
    let full_name = &staged.full_name;
    let in_message = |err: Error, field: Option<u32>| err.with_context(Some(full_name), field);

    let mut fields = Vec::with_capacity(staged.proto.fields.len());
    let mut by_number = FxHashMap::default();
    let mut offset = 0u32;
    let mut presence_bits = 0u32;

    for proto in &staged.proto.fields {
        let name = proto
            .name
            .clone()
            .ok_or_else(|| in_message(malformed(), None))?;
        let number = match proto.number {
            Some(number) if number > 0 => number as u32,
            _ => return Err(in_message(malformed(), None)),
        };
        let label = proto
            .label
            .and_then(Label::from_proto)
            .ok_or_else(|| in_message(malformed(), Some(number)))?;
        let field_type = proto
            .field_type
            .and_then(FieldType::from_proto)
            .ok_or_else(|| in_message(malformed(), Some(number)))?;

        let type_ref = match field_type {
            FieldType::Message | FieldType::Group => {
                let target = proto
                    .type_name
                    .as_deref()
                    .ok_or_else(|| in_message(malformed(), Some(number)))?;
                match resolve(target) {
                    Some(Symbol::Message(index)) => Some(TypeRef::Message(index)),
                    _ => {
                        return Err(in_message(Error::new(ErrorKind::BadRef), Some(number)));
                    }
                }
            }
            FieldType::Enum => {
                let target = proto
                    .type_name
                    .as_deref()
                    .ok_or_else(|| in_message(malformed(), Some(number)))?;
                match resolve(target) {
                    Some(Symbol::Enum(index)) => Some(TypeRef::Enum(index)),
                    _ => {
                        return Err(in_message(Error::new(ErrorKind::BadRef), Some(number)));
                    }
                }
            }
            _ => None,
        };

        let default = match &proto.default_value {
            Some(text) => {
                let enum_desc = match type_ref {
                    Some(TypeRef::Enum(index)) => Some(if index < old_enums.len() {
                        &old_enums[index]
                    } else {
                        &new_enums[index - old_enums.len()]
                    }),
                    _ => None,
                };
                parse_default(field_type, text, enum_desc)
                    .map_err(|err| in_message(err, Some(number)))?
            }
            None => None,
        };

        // Reflected layout: slots at natural alignment in declaration order,
        // repeated fields occupy one handle slot.
        let (size, align) = if label == Label::Repeated {
            (8, 8)
        } else {
            field_type.layout()
        };
        offset = align_up(offset, align);
        let field_offset = offset;
        offset += size;

        let set_bit = if label == Label::Repeated {
            None
        } else {
            let bit = presence_bits;
            presence_bits += 1;
            Some(bit)
        };

        let index = fields.len();
        if by_number.insert(number, index).is_some() {
            return Err(in_message(malformed(), Some(number)));
        }
        fields.push(Arc::new(FieldDescriptor {
            number,
            name,
            label,
            field_type,
            type_ref,
            offset: field_offset,
            set_bit,
            default,
        }));
    }

    // Presence bitmap sits after the field slots; total size is rounded to
    // pointer alignment.
    let instance_size = align_up(offset + presence_bits.div_ceil(8), 8);

    Ok(MessageDescriptor {
        full_name: full_name.clone(),
        fields,
        by_number,
        instance_size,
        presence_bits,
    })
}

fn align_up(offset: u32, align: u32) -> u32 {
    offset.next_multiple_of(align)
}

fn parse_default(
    field_type: FieldType,
    text: &str,
    enum_desc: Option<&Arc<EnumDescriptor>>,
) -> Result<Option<Value>, Error> {
    let value = match field_type {
        FieldType::Int32 | FieldType::SInt32 | FieldType::SFixed32 => {
            Value::Int32(text.parse().map_err(|_| malformed())?)
        }
        FieldType::Int64 | FieldType::SInt64 | FieldType::SFixed64 => {
            Value::Int64(text.parse().map_err(|_| malformed())?)
        }
        FieldType::UInt32 | FieldType::Fixed32 => {
            Value::UInt32(text.parse().map_err(|_| malformed())?)
        }
        FieldType::UInt64 | FieldType::Fixed64 => {
            Value::UInt64(text.parse().map_err(|_| malformed())?)
        }
        FieldType::Bool => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(malformed()),
        },
        FieldType::Float => Value::Float(text.parse().map_err(|_| malformed())?),
        FieldType::Double => Value::Double(text.parse().map_err(|_| malformed())?),
        FieldType::Enum => {
            let desc = enum_desc.ok_or_else(malformed)?;
            Value::Enum(desc.number(text).ok_or_else(malformed)?)
        }
        // String, bytes and submessage defaults have no scalar representation.
        _ => return Ok(None),
    };
    Ok(Some(value))
}
