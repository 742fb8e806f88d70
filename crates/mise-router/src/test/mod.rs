mod scenario_test;
