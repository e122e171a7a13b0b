use lazy_regex::regex_is_match;
use sievefwd::{Filter, SyntaxError, parse, parse_script};
use sievefwd::ast::{Command, ElseBranch};
use sievefwd::lexer::tokenize;

#[test]
fn unterminated_string() {
    let err = Filter::parse(r#"fileinto "Archive;"#).unwrap_err();
    assert!(matches!(err, SyntaxError::UnterminatedString { .. }));
    assert!(regex_is_match!(r"^unexpected end of input at position \d+", &err.to_string()));
}

#[test]
fn error_messages() {
    let err = parse_script("if header :contains \"subject\" \"x\" { keep; ").unwrap_err();
    assert_eq!(err.position(), 42);
    assert!(regex_is_match!(
        r"^unexpected end of input at position 42, expected \(\}\)$",
        &err.to_string()
    ));

    let err = parse_script("keep; redirect \"a@b\";").unwrap_err();
    assert!(regex_is_match!(
        r#"^unexpected identifier "redirect" at position 6, expected \(require\|if\|keep\|fileinto\|addflag\|discard\)$"#,
        &err.to_string()
    ));

    let err = parse_script("keep; 42").unwrap_err();
    assert_eq!(err.to_string(), "unexpected character '4' at position 6");
}

#[test]
fn elsif_chain_nests() {
    let program = parse_script(
        r#"if header :contains "a" "1" { keep; }
           elsif header :contains "b" "2" { keep; }
           elsif header :contains "c" "3" { keep; }
           else { discard; }"#,
    )
    .unwrap();
    let Command::If(mut node) = program.commands[0].clone() else {
        panic!("expected if");
    };
    let mut depth = 0;
    while let Some(ElseBranch::ElsIf(next)) = node.else_branch {
        node = *next;
        depth += 1;
    }
    assert_eq!(depth, 2);
    assert!(matches!(node.else_branch, Some(ElseBranch::Else(_))));
}

#[test]
fn commands_nest_in_blocks() {
    let program = parse_script(
        r#"if header :contains "subject" "x" {
               if address :is "from" "a@b" { fileinto "Inner"; }
               require "fileinto";
           }"#,
    )
    .unwrap();
    let Command::If(node) = &program.commands[0] else {
        panic!("expected if");
    };
    assert!(matches!(node.block.commands[0], Command::If(_)));
    assert!(matches!(node.block.commands[1], Command::Require { .. }));
}

#[test]
fn parse_from_tokens() {
    let tokens = tokenize("discard;").unwrap();
    assert_eq!(parse(tokens).unwrap().commands, [Command::Discard]);
    assert!(parse_script("").unwrap().commands.is_empty());
}
