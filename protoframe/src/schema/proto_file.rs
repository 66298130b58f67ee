//! Reads `.proto` source (proto2 or proto3) in to the reflection layout the
//! loader builds schemas from.
//!
//! Messages, enums, oneofs, maps and the `packed` option are understood.
//! Services, extensions, reserved ranges and other options are skipped.
//! Imports are skipped too, so types they provide won't resolve. Groups are
//! rejected.

use std::{collections::BTreeMap, fmt, iter::Peekable, str::Chars};

use tracing::debug;

use super::loader::{FieldDef, FieldOptions, OneofDef, ReflectionNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SyntaxError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Identifiers, including dotted names and keywords.
    Ident(String),
    /// Numeric literals, unparsed.
    Number(String),
    Str(String),
    Symbol(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(text) | Self::Number(text) => write!(f, "{}", text),
            Self::Str(text) => write!(f, "\"{}\"", text),
            Self::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, first: char, mut keep: impl FnMut(char) -> bool) -> String {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !keep(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    fn skip_comment(&mut self) -> Result<(), SyntaxError> {
        match self.bump() {
            Some('/') => {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
                Ok(())
            }
            Some('*') => {
                let mut star = false;
                while let Some(c) = self.bump() {
                    if star && c == '/' {
                        return Ok(());
                    }
                    star = c == '*';
                }
                Err(self.error("unterminated comment"))
            }
            _ => Err(self.error("unexpected /")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, SyntaxError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(text),
                Some('\\') => match self.bump() {
                    Some(c) => text.push(c),
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => text.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    /// Every token with the line it starts on.
    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, SyntaxError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.bump() {
            let line = self.line;
            let token = match c {
                c if c.is_whitespace() => continue,
                '/' => {
                    self.skip_comment()?;
                    continue;
                }
                '"' | '\'' => Token::Str(self.string(c)?),
                c if c.is_ascii_digit() => {
                    let mut previous = c;
                    Token::Number(self.take_while(c, |next| {
                        let keep = next.is_ascii_alphanumeric()
                            || next == '.'
                            || (matches!(next, '+' | '-') && matches!(previous, 'e' | 'E'));
                        previous = next;
                        keep
                    }))
                }
                c if c.is_alphabetic() || c == '_' || c == '.' => Token::Ident(
                    self.take_while(c, |next| next.is_alphanumeric() || next == '_' || next == '.'),
                ),
                c => Token::Symbol(c),
            };
            tokens.push((token, line));
        }
        Ok(tokens)
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    proto3: bool,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |(_, line)| *line)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line(),
            message: message.into(),
        }
    }

    fn next(&mut self) -> Result<Token, SyntaxError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|(token, _)| token.clone())
            .ok_or_else(|| self.error("unexpected end of file"))?;
        self.pos += 1;
        Ok(token)
    }

    fn is_symbol(&self, symbol: char) -> bool {
        self.peek() == Some(&Token::Symbol(symbol))
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(text)) if text == keyword)
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), SyntaxError> {
        match self.next()? {
            Token::Symbol(found) if found == symbol => Ok(()),
            found => {
                self.pos -= 1;
                Err(self.error(format!("expected {} but found {}", symbol, found)))
            }
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        match self.next()? {
            Token::Ident(text) => Ok(text),
            found => {
                self.pos -= 1;
                Err(self.error(format!("expected a name but found {}", found)))
            }
        }
    }

    fn integer(&mut self) -> Result<i64, SyntaxError> {
        let negative = self.is_symbol('-');
        if negative {
            self.pos += 1;
        }
        let text = match self.next()? {
            Token::Number(text) => text,
            found => {
                self.pos -= 1;
                return Err(self.error(format!("expected a number but found {}", found)));
            }
        };
        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            i64::from_str_radix(hex, 16)
        } else if text.len() > 1 && text.starts_with('0') {
            i64::from_str_radix(&text[1..], 8)
        } else {
            text.parse()
        };
        let value = parsed.map_err(|_| self.error(format!("invalid integer {}", text)))?;
        Ok(if negative { -value } else { value })
    }

    /// Skip to the end of the current statement, including any aggregate
    /// option value.
    fn skip_statement(&mut self) -> Result<(), SyntaxError> {
        let mut depth = 0usize;
        loop {
            match self.next()? {
                Token::Symbol('{') => depth += 1,
                Token::Symbol('}') => depth = depth.saturating_sub(1),
                Token::Symbol(';') if depth == 0 => return Ok(()),
                _ => {}
            }
        }
    }

    /// Skip a header and its `{ ... }` body.
    fn skip_block(&mut self) -> Result<(), SyntaxError> {
        while !self.is_symbol('{') {
            self.next()?;
        }
        let mut depth = 0usize;
        loop {
            match self.next()? {
                Token::Symbol('{') => depth += 1,
                Token::Symbol('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    fn file(&mut self) -> Result<ReflectionNode, SyntaxError> {
        let mut package: Option<String> = None;
        let mut definitions = BTreeMap::new();
        while let Some(token) = self.peek() {
            let keyword = match token {
                Token::Symbol(';') => {
                    self.pos += 1;
                    continue;
                }
                Token::Ident(keyword) => keyword.clone(),
                found => return Err(self.error(format!("unexpected {}", found))),
            };
            match keyword.as_str() {
                "syntax" => self.syntax()?,
                "package" => {
                    self.pos += 1;
                    if package.is_some() {
                        return Err(self.error("more than one package"));
                    }
                    package = Some(self.ident()?);
                    self.expect_symbol(';')?;
                }
                "import" => {
                    debug!("Skipping import on line {}", self.line());
                    self.skip_statement()?;
                }
                "option" => self.skip_statement()?,
                "message" => {
                    let (name, node) = self.message()?;
                    definitions.insert(name, node);
                }
                "enum" => {
                    let (name, node) = self.enumeration()?;
                    definitions.insert(name, node);
                }
                "service" | "extend" => self.skip_block()?,
                _ => return Err(self.error(format!("unexpected {}", keyword))),
            }
        }
        let mut root = ReflectionNode {
            nested: definitions,
            ..ReflectionNode::default()
        };
        if let Some(package) = package {
            for part in package.trim_start_matches('.').rsplit('.') {
                root = ReflectionNode {
                    nested: BTreeMap::from([(part.to_string(), root)]),
                    ..ReflectionNode::default()
                };
            }
        }
        Ok(root)
    }

    fn syntax(&mut self) -> Result<(), SyntaxError> {
        self.pos += 1;
        self.expect_symbol('=')?;
        match self.next()? {
            Token::Str(syntax) if syntax == "proto2" => self.proto3 = false,
            Token::Str(syntax) if syntax == "proto3" => self.proto3 = true,
            found => return Err(self.error(format!("unsupported syntax {}", found))),
        }
        self.expect_symbol(';')
    }

    fn message(&mut self) -> Result<(String, ReflectionNode), SyntaxError> {
        self.pos += 1;
        let name = self.ident()?;
        self.expect_symbol('{')?;
        let mut fields = BTreeMap::new();
        let mut node = ReflectionNode::default();
        loop {
            let keyword = match self.next()? {
                Token::Symbol('}') => break,
                Token::Symbol(';') => continue,
                Token::Ident(keyword) => keyword,
                found => return Err(self.error(format!("unexpected {}", found))),
            };
            match keyword.as_str() {
                "message" | "enum" => {
                    self.pos -= 1;
                    let (nested_name, nested) = if keyword == "message" {
                        self.message()?
                    } else {
                        self.enumeration()?
                    };
                    node.nested.insert(nested_name, nested);
                }
                "oneof" => {
                    let oneof_name = self.ident()?;
                    self.expect_symbol('{')?;
                    let mut members = Vec::new();
                    while !self.is_symbol('}') {
                        if self.is_keyword("option") {
                            self.skip_statement()?;
                            continue;
                        }
                        let type_name = self.ident()?;
                        let (field_name, def) = self.field(None, type_name)?;
                        members.push(field_name.clone());
                        insert_field(&mut fields, field_name, def).map_err(|e| self.error(e))?;
                    }
                    self.pos += 1;
                    node.oneofs.insert(oneof_name, OneofDef { oneof: members });
                }
                "option" | "reserved" | "extensions" => self.skip_statement()?,
                "extend" => self.skip_block()?,
                "map" if self.is_symbol('<') => {
                    let (field_name, def) = self.map_field()?;
                    insert_field(&mut fields, field_name, def).map_err(|e| self.error(e))?;
                }
                "optional" | "required" | "repeated" => {
                    let type_name = self.ident()?;
                    let (field_name, def) = self.field(Some(keyword), type_name)?;
                    insert_field(&mut fields, field_name, def).map_err(|e| self.error(e))?;
                }
                _ => {
                    let (field_name, def) = self.field(None, keyword)?;
                    insert_field(&mut fields, field_name, def).map_err(|e| self.error(e))?;
                }
            }
        }
        node.fields = Some(fields);
        Ok((name, node))
    }

    fn field(
        &mut self,
        label: Option<String>,
        type_name: String,
    ) -> Result<(String, FieldDef), SyntaxError> {
        if type_name == "group" {
            return Err(self.error("groups are not supported"));
        }
        let name = self.ident()?;
        let id = self.field_id()?;
        let mut packed = self.field_options()?;
        let repeated = label.as_deref() == Some("repeated");
        if repeated && !self.proto3 && packed.is_none() {
            packed = Some(false);
        }
        Ok((
            name,
            FieldDef {
                type_name,
                id,
                rule: label,
                key_type: None,
                options: FieldOptions { packed },
            },
        ))
    }

    fn map_field(&mut self) -> Result<(String, FieldDef), SyntaxError> {
        self.expect_symbol('<')?;
        let key_type = self.ident()?;
        self.expect_symbol(',')?;
        let type_name = self.ident()?;
        self.expect_symbol('>')?;
        let name = self.ident()?;
        let id = self.field_id()?;
        self.field_options()?;
        Ok((
            name,
            FieldDef {
                type_name,
                id,
                rule: None,
                key_type: Some(key_type),
                options: FieldOptions::default(),
            },
        ))
    }

    fn field_id(&mut self) -> Result<u32, SyntaxError> {
        self.expect_symbol('=')?;
        let id = self.integer()?;
        u32::try_from(id).map_err(|_| self.error(format!("invalid field id {}", id)))
    }

    /// Read `[name = value, ...] ;`, returning the `packed` option if set.
    fn field_options(&mut self) -> Result<Option<bool>, SyntaxError> {
        let mut packed = None;
        if self.is_symbol('[') {
            self.pos += 1;
            loop {
                let mut name = String::new();
                while !self.is_symbol('=') {
                    name.push_str(&self.next()?.to_string());
                }
                self.pos += 1;
                let mut value = Vec::new();
                let mut depth = 0usize;
                loop {
                    match self.peek() {
                        Some(Token::Symbol(',' | ']')) if depth == 0 => break,
                        Some(Token::Symbol('{')) => depth += 1,
                        Some(Token::Symbol('}')) => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    value.push(self.next()?);
                }
                if name == "packed" {
                    packed = match value.as_slice() {
                        [Token::Ident(flag)] if flag == "true" => Some(true),
                        [Token::Ident(flag)] if flag == "false" => Some(false),
                        _ => return Err(self.error("packed must be true or false")),
                    };
                }
                match self.next()? {
                    Token::Symbol(',') => continue,
                    _ => break,
                }
            }
        }
        self.expect_symbol(';')?;
        Ok(packed)
    }

    fn enumeration(&mut self) -> Result<(String, ReflectionNode), SyntaxError> {
        self.pos += 1;
        let name = self.ident()?;
        self.expect_symbol('{')?;
        let mut values = Vec::new();
        loop {
            if self.is_symbol('}') {
                self.pos += 1;
                break;
            }
            if self.is_symbol(';') {
                self.pos += 1;
                continue;
            }
            if self.is_keyword("option") || self.is_keyword("reserved") {
                self.skip_statement()?;
                continue;
            }
            let value_name = self.ident()?;
            self.expect_symbol('=')?;
            let number = self.integer()?;
            let number = i32::try_from(number)
                .map_err(|_| self.error(format!("{} is out of range", value_name)))?;
            self.field_options()?;
            values.push((value_name, number));
        }
        Ok((
            name,
            ReflectionNode {
                values: Some(values),
                ..ReflectionNode::default()
            },
        ))
    }
}

fn insert_field(
    fields: &mut BTreeMap<String, FieldDef>,
    name: String,
    def: FieldDef,
) -> Result<(), String> {
    if fields.contains_key(&name) {
        return Err(format!("duplicate field {}", name));
    }
    fields.insert(name, def);
    Ok(())
}

/// Parse `.proto` source.
pub(super) fn parse(text: &str) -> Result<ReflectionNode, SyntaxError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        proto3: false,
    };
    parser.file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        proto::binlog::{MESSAGE_TYPE, SCHEMA_JSON},
        schema::{FieldType, Schema},
    };

    #[test]
    fn binlog_matches_reflection_json() {
        let from_proto = Schema::from_proto(include_str!("../../proto/binlog.proto")).unwrap();
        let from_json = Schema::from_json(SCHEMA_JSON).unwrap();
        assert_eq!(from_proto.message(MESSAGE_TYPE), from_json.message(MESSAGE_TYPE));
        assert!(from_proto
            .message(MESSAGE_TYPE)
            .unwrap()
            .field_by_name("type")
            .unwrap()
            .is_required());
    }

    #[test]
    fn proto3_definitions() {
        let schema = Schema::from_proto(
            r#"
            syntax = "proto3";
            package shop.v1;
            import "google/protobuf/empty.proto";
            option java_package = "shop";

            /* an order */
            message Order {
                enum Status {
                    option allow_alias = true;
                    OPEN = 0;
                    CLOSED = 1;
                    SHUT = 1;
                    LOST = -1;
                }
                reserved 9, 10 to 12;
                uint64 id = 1;
                Status status = 2;
                repeated Line lines = 3;
                map<string, int32> counts = 4 [deprecated = true];
                oneof payment {
                    string card = 5;
                    bool cash = 6;
                }
                repeated sint32 codes = 7 [packed = false];
                repeated fixed32 weights = 0x8;
                optional string note = 13;
            }

            message Line { string sku = 1; }

            service Shop {
                rpc Place (Order) returns (Order) { option idempotency_level = IDEMPOTENT; }
            }
            "#,
        )
        .unwrap();
        let order = schema.message("shop.v1.Order").unwrap();
        assert_eq!(
            order.field_by_name("status").unwrap().field_type,
            FieldType::Enum("shop.v1.Order.Status".to_string())
        );
        assert_eq!(
            order.field_by_name("lines").unwrap().field_type,
            FieldType::Message("shop.v1.Line".to_string())
        );
        assert!(order.field_by_name("counts").unwrap().is_map());
        assert_eq!(
            order.field_by_name("cash").unwrap().oneof.as_deref(),
            Some("payment")
        );
        assert!(!order.field_by_name("codes").unwrap().packed);
        assert!(order.field_by_name("weights").unwrap().packed);
        assert_eq!(order.field_by_tag(8).unwrap().name, "weights");
        assert!(!order.field_by_name("note").unwrap().is_required());
        let status = schema.enumeration("shop.v1.Order.Status").unwrap();
        assert_eq!(status.name_of(1), Some("CLOSED"));
        assert_eq!(status.value_of("LOST"), Some(-1));
    }

    #[test]
    fn proto2_repeated_scalars_are_unpacked() {
        let schema = Schema::from_proto(
            "message Sample { repeated int32 a = 1; repeated int32 b = 2 [packed=true]; }",
        )
        .unwrap();
        let sample = schema.message("Sample").unwrap();
        assert!(!sample.field_by_name("a").unwrap().packed);
        assert!(sample.field_by_name("b").unwrap().packed);
    }

    #[test]
    fn syntax_errors_carry_the_line() {
        let err = parse("syntax = \"proto2\";\n\nmessage A {\n  required string = 1;\n}").unwrap_err();
        assert_eq!(err.line, 4);
        assert!(parse("message A { optional group G = 1 { } }").is_err());
        assert!(parse("message A { int32 a = 1; int32 a = 2; }").is_err());
        assert!(parse("/* open").is_err());
        assert!(parse("message A {").is_err());
    }
}
