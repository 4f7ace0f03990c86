fn main() {
    cynic_codegen::register_schema("socialgraph")
        .from_sdl_file("schemas/socialgraph.graphql")
        .expect("schemas/socialgraph.graphql is missing")
        .as_default()
        .expect("schemas/socialgraph.graphql is not valid SDL");
}
