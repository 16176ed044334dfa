use std::path::Path;

use phpunit_explorer::ast::mago::MagoAstParser;
use phpunit_explorer::ast::tree_sitter::TreeSitterAstParser;
use phpunit_explorer::ast::{AstNode, AstParser, ChainAstParser};
use phpunit_explorer::data_provider::DataProviderParser;
use phpunit_explorer::{TestDefinition, TestParser};

const PROVIDERS: &str = concat!(
    "<?php\n",
    "\n",
    "namespace Tests\\Unit;\n",
    "\n",
    "use PHPUnit\\Framework\\TestCase;\n",
    "\n",
    "class ProviderTest extends TestCase\n",
    "{\n",
    "    public static function named(): array\n",
    "    {\n",
    "        return ['foo' => [1, 2, 3], 'bar' => [4, 5, 9]];\n",
    "    }\n",
    "\n",
    "    public static function positional(): array\n",
    "    {\n",
    "        return [[0, 0, 0], [0, 1, 1]];\n",
    "    }\n",
    "\n",
    "    public static function mixed(): array\n",
    "    {\n",
    "        return ['first' => [1], [2], 'third' => [3]];\n",
    "    }\n",
    "\n",
    "    public static function dynamic(): array\n",
    "    {\n",
    "        return array_map(fn ($i) => [$i], range(1, 3));\n",
    "    }\n",
    "\n",
    "    public static function generated(): iterable\n",
    "    {\n",
    "        yield 'one' => [1];\n",
    "        yield [2];\n",
    "    }\n",
    "}\n",
);

fn provider_keys(parser: &dyn AstParser, method: &str) -> Vec<String> {
    let Some(AstNode::Program(program)) = parser.parse(PROVIDERS, Path::new("/project/tests/Unit/ProviderTest.php")) else {
        panic!("{} failed to parse the fixture", parser.name());
    };
    let AstNode::Namespace(namespace) = &program.children[0] else {
        panic!("expected a namespace, got {:?}", program.children[0]);
    };
    let class = namespace
        .children
        .iter()
        .find_map(|node| match node {
            AstNode::Class(class) => Some(class),
            _ => None,
        })
        .expect("class");
    let node = class
        .body
        .iter()
        .find(|node| matches!(node, AstNode::Method(m) if m.name == method))
        .expect("method");
    DataProviderParser::parse(node).collect()
}

// ─── Data providers ─────────────────────────────────────────────────────────

#[test]
fn test_data_provider_keys_on_every_backend() {
    let backends: Vec<Box<dyn AstParser>> = vec![
        Box::new(TreeSitterAstParser::new()),
        Box::new(MagoAstParser::new()),
        Box::new(ChainAstParser::default()),
    ];
    for backend in &backends {
        let backend = backend.as_ref();
        assert_eq!(provider_keys(backend, "named"), vec!["\"foo\"", "\"bar\""], "{}", backend.name());
        assert_eq!(provider_keys(backend, "positional"), vec!["#0", "#1"], "{}", backend.name());
        assert_eq!(
            provider_keys(backend, "mixed"),
            vec!["\"first\"", "#1", "\"third\""],
            "{}",
            backend.name()
        );
        assert!(provider_keys(backend, "dynamic").is_empty(), "{}", backend.name());
        assert_eq!(provider_keys(backend, "generated"), vec!["\"one\"", "#1"], "{}", backend.name());
    }
}

// ─── Backend parity ─────────────────────────────────────────────────────────

const SUITE: &str = concat!(
    "<?php\n",
    "\n",
    "namespace Tests\\Feature;\n",
    "\n",
    "use PHPUnit\\Framework\\TestCase;\n",
    "\n",
    "trait ChecksHealth\n",
    "{\n",
    "    public function test_health() {}\n",
    "}\n",
    "\n",
    "abstract class BaseCase extends TestCase\n",
    "{\n",
    "    public function test_inherited() {}\n",
    "}\n",
    "\n",
    "/**\n",
    " * @group feature\n",
    " */\n",
    "class CheckoutTest extends BaseCase\n",
    "{\n",
    "    use ChecksHealth;\n",
    "\n",
    "    /**\n",
    "     * @dataProvider amounts\n",
    "     * @depends test_inherited\n",
    "     */\n",
    "    public function test_total(int $amount) {}\n",
    "\n",
    "    /** @test */\n",
    "    public function it_checks_out() {}\n",
    "\n",
    "    protected function test_helper() {}\n",
    "\n",
    "    public static function amounts(): array\n",
    "    {\n",
    "        return ['small' => [1], 'large' => [1000]];\n",
    "    }\n",
    "}\n",
);

#[derive(Debug, PartialEq)]
struct Summary {
    id: String,
    label: String,
    line: u32,
    depth: usize,
    groups: Vec<String>,
    depends: Vec<String>,
    data_sets: Vec<String>,
}

fn summarize(parser: Box<dyn AstParser>) -> Vec<Summary> {
    let mut test_parser = TestParser::with_ast_parser("/project", parser);
    let definitions = test_parser.parse_definitions(SUITE, Path::new("/project/tests/Feature/CheckoutTest.php"), None);
    definitions
        .iter()
        .flat_map(TestDefinition::flatten)
        .map(|d| Summary {
            id: d.id.clone(),
            label: d.label.clone(),
            line: d.start.line,
            depth: d.depth,
            groups: d.annotations.group.clone(),
            depends: d.annotations.depends.clone(),
            data_sets: d.data_sets.clone(),
        })
        .collect()
}

#[test]
fn test_backends_discover_the_same_tests() {
    let tree_sitter = summarize(Box::new(TreeSitterAstParser::new()));
    let mago = summarize(Box::new(MagoAstParser::new()));
    assert_eq!(tree_sitter, mago);

    let ids: Vec<&str> = tree_sitter.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "Tests\\Feature\\CheckoutTest",
            "Tests\\Feature\\CheckoutTest::test_total",
            "Tests\\Feature\\CheckoutTest::it_checks_out",
            "Tests\\Feature\\CheckoutTest::test_health",
            "Tests\\Feature\\CheckoutTest::test_inherited",
        ]
    );

    let total = &tree_sitter[1];
    assert_eq!(total.data_sets, vec!["\"small\"", "\"large\""]);
    assert_eq!(total.depends, vec!["test_inherited"]);
    assert_eq!(tree_sitter[0].groups, vec!["feature"]);

    // Inherited methods point at the inheriting class.
    assert_eq!(tree_sitter[3].line, tree_sitter[0].line);
    assert_eq!(tree_sitter[4].line, tree_sitter[0].line);
}

#[test]
fn test_chain_falls_back_to_tolerant_backend() {
    let broken = concat!(
        "<?php\n",
        "\n",
        "class RecoveredTest extends TestCase\n",
        "{\n",
        "    public function test_kept() {}\n",
        "\n",
        "    public function broken( {\n",
        "}\n",
    );
    let path = Path::new("/project/tests/RecoveredTest.php");
    assert!(TreeSitterAstParser::new().parse(broken, path).is_none());
    assert!(ChainAstParser::default().parse(broken, path).is_some());
}

// ─── Attributes ─────────────────────────────────────────────────────────────

const ATTRIBUTES: &str = concat!(
    "<?php\n",
    "\n",
    "namespace Tests;\n",
    "\n",
    "use App\\Attributes\\Test;\n",
    "use PHPUnit\\Framework\\Attributes\\DataProvider as DP;\n",
    "use PHPUnit\\Framework\\TestCase;\n",
    "\n",
    "class AliasTest extends TestCase\n",
    "{\n",
    "    #[DP('rows')]\n",
    "    public function test_rows(int $n) {}\n",
    "\n",
    "    #[Test]\n",
    "    public function not_a_phpunit_test() {}\n",
    "\n",
    "    public static function rows(): array\n",
    "    {\n",
    "        return ['one' => [1], 'two' => [2]];\n",
    "    }\n",
    "}\n",
);

#[test]
fn test_attributes_resolve_through_use_imports() {
    let backends: Vec<Box<dyn AstParser>> = vec![Box::new(TreeSitterAstParser::new()), Box::new(MagoAstParser::new())];
    for backend in backends {
        let name = backend.name();
        let mut parser = TestParser::with_ast_parser("/project", backend);
        let definitions = parser.parse_definitions(ATTRIBUTES, Path::new("/project/tests/AliasTest.php"), None);

        assert_eq!(definitions.len(), 1, "{}", name);
        let methods = &definitions[0].children;
        let ids: Vec<&str> = methods.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["Tests\\AliasTest::test_rows"], "{}", name);
        assert_eq!(methods[0].annotations.data_provider, vec!["rows"], "{}", name);
        assert_eq!(methods[0].data_sets, vec!["\"one\"", "\"two\""], "{}", name);
    }
}
