mod simplify_props;
