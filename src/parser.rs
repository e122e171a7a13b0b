// Recursive descent parser for filter scripts.
//
// Grammar:
//   program     := command* EOF
//   command     := require | if | keep | discard | fileinto | addflag
//   if          := ("if" | "elsif") test block (elsif | "else" block)?
//   test        := header | address | allof | anyof
//   header      := "header" [:comparator s] [:match] stringlist stringlist
//   address     := "address" [:comparator s] [:part] [:match] stringlist stringlist
//   stringlist  := string | "[" string ("," string)* "]"
//
// Tagged arguments are recognized with two tokens of lookahead and must
// appear in the order above.

use crate::ast::{
    AddressPart, AddressTest, Block, Command, ElseBranch, HeaderTest, If, MatchType, Program,
    StringList, Test,
};
use crate::error::SyntaxError;
use crate::lexer::{Token, TokenKind, tokenize};

const COMMANDS: [&str; 6] = ["require", "if", "keep", "fileinto", "addflag", "discard"];
const TESTS: [&str; 4] = ["header", "address", "allof", "anyof"];

/// Tokenizes and parses a complete script.
pub fn parse_script(source: &str) -> Result<Program, SyntaxError> {
    parse(tokenize(source)?)
}

/// Parses a token stream into a [`Program`], consuming every token through `Eof`.
pub fn parse(tokens: Vec<Token>) -> Result<Program, SyntaxError> {
    Parser::new(tokens).parse_program()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let position = tokens.last().map_or(0, |t| t.end);
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                position,
                end: position,
            });
        }
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error<S: ToString>(&self, expected: &[S]) -> SyntaxError {
        let token = self.peek();
        let expected = expected.iter().map(ToString::to_string).collect();
        match token.kind {
            TokenKind::Eof => SyntaxError::UnexpectedEnd {
                expected,
                position: token.position,
            },
            TokenKind::Identifier | TokenKind::String => SyntaxError::UnexpectedToken {
                expected,
                found: format!("{} {:?}", token.kind, token.text),
                position: token.position,
            },
            _ => SyntaxError::UnexpectedToken {
                expected,
                found: format!("{:?}", token.text),
                position: token.position,
            },
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        if self.peek().kind != kind {
            return Err(self.error(&[kind]));
        }
        Ok(self.advance())
    }

    /// Requires an identifier out of `words`, returning the matched word.
    fn expect_keyword(&mut self, words: &[&str]) -> Result<String, SyntaxError> {
        let token = self.peek();
        if token.kind != TokenKind::Identifier {
            return Err(self.error(&[TokenKind::Identifier]));
        }
        if !words.contains(&token.text.as_str()) {
            return Err(self.error(words));
        }
        Ok(self.advance().text)
    }

    /// True if the next two tokens are `:` and an identifier from `tags`.
    fn at_tag(&self, tags: &[&str]) -> bool {
        let next = self.peek_next();
        self.peek().kind == TokenKind::Colon
            && next.kind == TokenKind::Identifier
            && tags.contains(&next.text.as_str())
    }

    pub fn parse_program(&mut self) -> Result<Program, SyntaxError> {
        let commands = self.parse_commands()?;
        let end = self.pos;
        self.expect(TokenKind::Eof)?;
        // only the final token may be Eof
        if end + 1 < self.tokens.len() {
            return Err(self.error(&[TokenKind::Eof]));
        }
        Ok(Program { commands })
    }

    fn parse_commands(&mut self) -> Result<Vec<Command>, SyntaxError> {
        let mut commands = Vec::new();
        while self.peek().kind == TokenKind::Identifier {
            commands.push(self.parse_command()?);
        }
        Ok(commands)
    }

    fn parse_command(&mut self) -> Result<Command, SyntaxError> {
        let word = self.peek().text.clone();
        if !COMMANDS.contains(&word.as_str()) {
            return Err(self.error(&COMMANDS));
        }
        match word.as_str() {
            "require" => {
                self.advance();
                let capabilities = self.parse_string_list()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Command::Require { capabilities })
            }
            "if" => Ok(Command::If(self.parse_if("if")?)),
            "keep" => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Command::Keep)
            }
            "discard" => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Command::Discard)
            }
            "fileinto" => {
                self.advance();
                let mailbox = self.expect(TokenKind::String)?.text;
                self.expect(TokenKind::Semicolon)?;
                Ok(Command::FileInto { mailbox })
            }
            _ => self.parse_addflag(),
        }
    }

    /// `if` and `elsif` share this production so chains nest naturally.
    fn parse_if(&mut self, keyword: &str) -> Result<If, SyntaxError> {
        self.expect_keyword(&[keyword])?;
        let test = self.parse_test()?;
        let block = self.parse_block()?;
        let else_branch = if self.peek().is_identifier("elsif") {
            Some(ElseBranch::ElsIf(Box::new(self.parse_if("elsif")?)))
        } else if self.peek().is_identifier("else") {
            self.advance();
            Some(ElseBranch::Else(self.parse_block()?))
        } else {
            None
        };
        Ok(If {
            test,
            block,
            else_branch,
        })
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        self.expect(TokenKind::LBrace)?;
        let commands = self.parse_commands()?;
        self.expect(TokenKind::RBrace)?;
        Ok(Block { commands })
    }

    /// `addflag [variablename] <list-of-flags>;`
    ///
    /// Two consecutive strings are read as a variable name followed by a
    /// single flag. This cannot be told apart from two flags written without
    /// brackets, which is therefore not accepted.
    fn parse_addflag(&mut self) -> Result<Command, SyntaxError> {
        self.expect_keyword(&["addflag"])?;
        let variable_name = if self.peek().kind == TokenKind::String
            && self.peek_next().kind == TokenKind::String
        {
            Some(self.advance().text)
        } else {
            None
        };
        let flags = self.parse_string_list()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Command::AddFlag {
            variable_name,
            flags,
        })
    }

    fn parse_test(&mut self) -> Result<Test, SyntaxError> {
        let word = self.expect_keyword(&TESTS)?;
        match word.as_str() {
            "header" => {
                let comparator = self.parse_comparator()?;
                let match_type = self.parse_match_type();
                let header_names = self.parse_string_list()?;
                let keys = self.parse_string_list()?;
                Ok(Test::Header(HeaderTest {
                    comparator,
                    match_type,
                    header_names,
                    keys,
                }))
            }
            "address" => {
                let comparator = self.parse_comparator()?;
                let address_part = self.parse_address_part();
                let match_type = self.parse_match_type();
                let headers = self.parse_string_list()?;
                let keys = self.parse_string_list()?;
                Ok(Test::Address(AddressTest {
                    comparator,
                    address_part,
                    match_type,
                    headers,
                    keys,
                }))
            }
            "allof" => Ok(Test::AllOf(self.parse_test_list()?)),
            _ => Ok(Test::AnyOf(self.parse_test_list()?)),
        }
    }

    /// `( test ("," test)* )`
    fn parse_test_list(&mut self) -> Result<Vec<Test>, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let mut tests = vec![self.parse_test()?];
        loop {
            match self.peek().kind {
                TokenKind::RParen => {
                    self.advance();
                    return Ok(tests);
                }
                TokenKind::Comma => {
                    self.advance();
                    tests.push(self.parse_test()?);
                }
                _ => return Err(self.error(&[TokenKind::RParen, TokenKind::Comma])),
            }
        }
    }

    fn parse_comparator(&mut self) -> Result<Option<String>, SyntaxError> {
        if !self.at_tag(&["comparator"]) {
            return Ok(None);
        }
        self.advance();
        self.advance();
        Ok(Some(self.expect(TokenKind::String)?.text))
    }

    fn parse_match_type(&mut self) -> Option<MatchType> {
        if !self.at_tag(&MatchType::TAGS) {
            return None;
        }
        self.advance();
        MatchType::from_tag(&self.advance().text)
    }

    fn parse_address_part(&mut self) -> Option<AddressPart> {
        if !self.at_tag(&AddressPart::TAGS) {
            return None;
        }
        self.advance();
        AddressPart::from_tag(&self.advance().text)
    }

    fn parse_string_list(&mut self) -> Result<StringList, SyntaxError> {
        if self.peek().kind == TokenKind::String {
            let value = self.advance().text;
            return Ok(StringList {
                values: vec![value],
            });
        }
        if self.peek().kind != TokenKind::LBracket {
            return Err(self.error(&[TokenKind::String, TokenKind::LBracket]));
        }
        self.advance();
        let mut values = vec![self.expect(TokenKind::String)?.text];
        loop {
            match self.peek().kind {
                TokenKind::RBracket => {
                    self.advance();
                    return Ok(StringList { values });
                }
                TokenKind::Comma => {
                    self.advance();
                    values.push(self.expect(TokenKind::String)?.text);
                }
                _ => return Err(self.error(&[TokenKind::RBracket, TokenKind::Comma])),
            }
        }
    }
}

#[test]
fn test_parse_if_chain() {
    let program = parse_script(
        r#"require ["fileinto", "imap4flags"];
        if header :contains "subject" "invoice" {
            fileinto "Invoices";
        } elsif address :is "from" "boss@example.com" {
            addflag "\\Flagged";
        } else {
            keep;
        }"#,
    )
    .unwrap();
    assert_eq!(program.commands.len(), 2);
    let Command::If(node) = &program.commands[1] else {
        panic!("expected if, got {:?}", program.commands[1]);
    };
    assert!(matches!(
        &node.test,
        Test::Header(HeaderTest {
            match_type: Some(MatchType::Contains),
            comparator: None,
            ..
        })
    ));
    let Some(ElseBranch::ElsIf(elsif)) = &node.else_branch else {
        panic!("expected elsif");
    };
    assert_eq!(
        elsif.block.commands,
        [Command::AddFlag {
            variable_name: None,
            flags: StringList {
                values: vec!["\\Flagged".to_string()]
            }
        }]
    );
    assert_eq!(
        elsif.else_branch,
        Some(ElseBranch::Else(Block {
            commands: vec![Command::Keep]
        }))
    );
}

#[test]
fn test_parse_tagged_arguments() {
    let program = parse_script(
        r#"if address :comparator "i;ascii-casemap" :domain :matches ["from", "sender"] "*.org" { discard; }"#,
    )
    .unwrap();
    let Command::If(node) = &program.commands[0] else {
        panic!("expected if");
    };
    assert_eq!(
        node.test,
        Test::Address(AddressTest {
            comparator: Some("i;ascii-casemap".into()),
            address_part: Some(AddressPart::Domain),
            match_type: Some(MatchType::Matches),
            headers: StringList {
                values: vec!["from".into(), "sender".into()]
            },
            keys: StringList {
                values: vec!["*.org".into()]
            },
        })
    );
}

#[test]
fn test_parse_addflag_variable_heuristic() {
    let program = parse_script(r#"addflag "flagvar" "\\Seen"; addflag ["a", "b"];"#).unwrap();
    assert_eq!(
        program.commands[0],
        Command::AddFlag {
            variable_name: Some("flagvar".into()),
            flags: StringList {
                values: vec!["\\Seen".into()]
            },
        }
    );
    assert_eq!(
        program.commands[1],
        Command::AddFlag {
            variable_name: None,
            flags: StringList {
                values: vec!["a".into(), "b".into()]
            },
        }
    );
}

#[test]
fn test_parse_errors() {
    assert_eq!(
        parse_script("keep").unwrap_err(),
        SyntaxError::UnexpectedEnd {
            expected: vec![";".into()],
            position: 4
        }
    );
    assert_eq!(
        parse_script("stop;").unwrap_err(),
        SyntaxError::UnexpectedToken {
            expected: COMMANDS.iter().map(|s| s.to_string()).collect(),
            found: "identifier \"stop\"".into(),
            position: 0
        }
    );
    assert_eq!(
        parse_script("keep; }").unwrap_err(),
        SyntaxError::UnexpectedToken {
            expected: vec!["EOF".into()],
            found: "\"}\"".into(),
            position: 6
        }
    );
    assert!(parse_script("if header \"subject\" [] { keep; }").is_err());
    assert!(parse_script("if allof () { keep; }").is_err());
    assert!(parse_script("if header :contains \"subject\" \"x\" keep;").is_err());
}

#[test]
fn test_parse_appends_missing_eof() {
    let mut tokens = tokenize("keep;").unwrap();
    tokens.pop();
    assert_eq!(
        parse(tokens).unwrap(),
        Program {
            commands: vec![Command::Keep]
        }
    );

    let source = r#"fileinto "a\"b""#;
    let mut tokens = tokenize(source).unwrap();
    tokens.pop();
    assert_eq!(
        parse(tokens).unwrap_err(),
        SyntaxError::UnexpectedEnd {
            expected: vec![";".into()],
            position: source.chars().count()
        }
    );
}

#[test]
fn test_parse_rejects_inner_eof() {
    let mut tokens = tokenize("keep;").unwrap();
    tokens.extend(tokenize("discard;").unwrap());
    assert_eq!(
        parse(tokens).unwrap_err(),
        SyntaxError::UnexpectedToken {
            expected: vec!["EOF".into()],
            found: "identifier \"discard\"".into(),
            position: 0
        }
    );
}
